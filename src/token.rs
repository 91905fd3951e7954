//! The 16-bit instruction unit stored in compiled word bodies.
//!
//! One width, one tag bit, three reference kinds:
//!
//! ```text
//! +-+---------------+
//! |1|    opcode     |  primitive, when the low bits are < Prim::COUNT
//! +-+---------------+
//! |1|   body pfa    |  user-defined word, low bits are its arena offset
//! +-+---------------+
//! |0|  dict index   |  builtin word, executed by direct table offset
//! +-+---------------+
//! ```
//!
//! The overlay is unambiguous because the first `USER_AREA` bytes of the
//! parameter arena are reserved, so no colon word's body can start below
//! the primitive-count threshold. Decoding never requires a dictionary
//! *search*: the token is the dispatch key (primitives), or a direct index
//! (builtins), or the jump target itself (colon words).

/// Tag bit marking a primitive opcode or a user-defined body offset.
pub const EXT_FLAG: u16 = 0x8000;

/// Bytes per instruction unit in the parameter arena.
pub const TOK_BYTES: u16 = 2;

/// Bytes per data cell in the parameter arena.
pub const CELL_BYTES: u16 = 4;

/// Reserved low region of the parameter arena (the user area), sized so
/// that every colon-word body offset clears the primitive range.
pub const USER_AREA: u16 = (Prim::COUNT + 15) & !15;

/// Primitive opcodes, dispatched by a direct match in the inner
/// interpreter. Order is load-bearing: the discriminant is the low half of
/// the encoded token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Prim {
    /// End of colon word; pops the return stack into the instruction pointer.
    Exit = 0,
    Nop,
    /// Decrement-and-branch for `for..next` counted loops.
    Next,
    /// Increment-and-compare for `do..loop` index loops.
    Loop,
    /// Push the inline cell that follows.
    Lit,
    /// Push the address of the inline data that follows, then exit.
    Var,
    /// Push (addr, len) of the inline string that follows.
    Str,
    /// Print the inline string that follows.
    DotQ,
    /// Unconditional branch to the inline target.
    Bran,
    /// Pop a flag; branch to the inline target when it is zero.
    ZBran,
    /// Push own data address, then jump through the inline target slot if
    /// it has been patched by `does>`.
    VBran,
    /// Patch the most recent word's `VBran` slot with the current IP.
    Does,
    /// Move the top of stack to the return stack as a loop counter.
    For,
    /// Move (limit, start) to the return stack as a loop frame.
    Do,
    /// Request a keypress from the host and park the VM.
    Key,
}

impl Prim {
    pub const COUNT: u16 = 15;

    /// Display names, used only by the `see` disassembler.
    pub const NAMES: [&'static str; Self::COUNT as usize] = [
        ";", "nop", "next", "loop", "lit", "var", "str", "dotq", "bran", "0bran", "vbran", "does>",
        "for", "do", "key",
    ];

    fn from_low(low: u16) -> Option<Self> {
        Some(match low {
            0 => Prim::Exit,
            1 => Prim::Nop,
            2 => Prim::Next,
            3 => Prim::Loop,
            4 => Prim::Lit,
            5 => Prim::Var,
            6 => Prim::Str,
            7 => Prim::DotQ,
            8 => Prim::Bran,
            9 => Prim::ZBran,
            10 => Prim::VBran,
            11 => Prim::Does,
            12 => Prim::For,
            13 => Prim::Do,
            14 => Prim::Key,
            _ => return None,
        })
    }
}

/// A decoded instruction unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Prim(Prim),
    /// Builtin word, payload is its dictionary index.
    Builtin(u16),
    /// User-defined word, payload is its body offset in the arena.
    Colon(u16),
}

impl Token {
    pub fn encode(self) -> u16 {
        match self {
            Token::Prim(p) => EXT_FLAG | (p as u16),
            Token::Colon(pfa) => {
                debug_assert!(pfa >= USER_AREA);
                debug_assert!(pfa & EXT_FLAG == 0);
                EXT_FLAG | pfa
            }
            Token::Builtin(idx) => {
                debug_assert!(idx & EXT_FLAG == 0);
                idx
            }
        }
    }

    pub fn decode(raw: u16) -> Self {
        if raw & EXT_FLAG != 0 {
            let low = raw & !EXT_FLAG;
            match Prim::from_low(low) {
                Some(p) => Token::Prim(p),
                None => Token::Colon(low),
            }
        } else {
            Token::Builtin(raw)
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::{Prim, Token, EXT_FLAG, USER_AREA};

    #[test]
    fn overlay_roundtrip() {
        for low in 0..Prim::COUNT {
            let tok = Token::decode(EXT_FLAG | low);
            assert!(matches!(tok, Token::Prim(_)));
            assert_eq!(tok.encode(), EXT_FLAG | low);
        }
        for pfa in [USER_AREA, 0x100, 0x7ffe] {
            let tok = Token::Colon(pfa);
            assert_eq!(Token::decode(tok.encode()), tok);
        }
        for idx in [0u16, 1, 57, 0x7fff] {
            let tok = Token::Builtin(idx);
            assert_eq!(Token::decode(tok.encode()), tok);
        }
    }

    #[test]
    fn user_area_clears_prims() {
        assert!(USER_AREA >= Prim::COUNT);
        assert_eq!(USER_AREA % 16, 0);
    }
}
