use crate::token::{Token, CELL_BYTES, TOK_BYTES, USER_AREA};

/// Parameter memory: a fixed-capacity, `u16`-addressed byte arena holding
/// colon-word names, token streams, and data cells. Append-only except for
/// `truncate` (used by `forget` and `boot`) and slot patching by the
/// compiler.
pub struct Pmem {
    buf: Box<[u8]>,
    here: u16,
}

#[derive(Debug, PartialEq)]
pub enum ArenaError {
    OutOfMemory,
    OutOfBounds,
    TruncateIntoReserved,
    BadUtf8,
}

impl Pmem {
    /// `capacity` must not exceed `0x8000` so every offset stays below the
    /// token tag bit and is addressable as a colon-word token.
    pub fn new(capacity: u16) -> Self {
        debug_assert!(capacity <= 0x8000);
        Self {
            buf: vec![0u8; capacity as usize].into_boxed_slice(),
            here: 0,
        }
    }

    #[inline]
    pub fn here(&self) -> u16 {
        self.here
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<u16, ArenaError> {
        let at = self.here;
        let end = (at as usize)
            .checked_add(bytes.len())
            .ok_or(ArenaError::OutOfMemory)?;
        if end > self.buf.len() {
            return Err(ArenaError::OutOfMemory);
        }
        self.buf[at as usize..end].copy_from_slice(bytes);
        self.here = end as u16;
        Ok(at)
    }

    /// Appends one instruction unit, returning its offset.
    pub fn push_tok(&mut self, tok: Token) -> Result<u16, ArenaError> {
        self.push_bytes(&tok.encode().to_le_bytes())
    }

    /// Appends one data cell, returning its offset.
    pub fn push_cell(&mut self, val: i32) -> Result<u16, ArenaError> {
        self.push_bytes(&val.to_le_bytes())
    }

    /// Appends a raw 16-bit value (branch targets, padding slots).
    pub fn push_half(&mut self, val: u16) -> Result<u16, ArenaError> {
        self.push_bytes(&val.to_le_bytes())
    }

    /// Appends a NUL-terminated string, padded to instruction-unit
    /// alignment. Returns the offset of the first byte.
    pub fn push_str(&mut self, s: &str) -> Result<u16, ArenaError> {
        let at = self.push_bytes(s.as_bytes())?;
        self.push_bytes(&[0])?;
        if self.here % TOK_BYTES != 0 {
            self.push_bytes(&[0])?;
        }
        Ok(at)
    }

    /// Storage length of a string appended by `push_str` (payload + NUL,
    /// rounded up to alignment). The IP skips this many bytes.
    pub fn aligned_strlen(s: &str) -> u16 {
        let raw = s.len() as u16 + 1;
        (raw + (TOK_BYTES - 1)) & !(TOK_BYTES - 1)
    }

    pub fn tok_at(&self, at: u16) -> Result<Token, ArenaError> {
        let b = self.slice(at, TOK_BYTES as usize)?;
        Ok(Token::decode(u16::from_le_bytes([b[0], b[1]])))
    }

    pub fn set_tok(&mut self, at: u16, tok: Token) -> Result<(), ArenaError> {
        let raw = tok.encode().to_le_bytes();
        self.slice_mut(at, TOK_BYTES as usize)?.copy_from_slice(&raw);
        Ok(())
    }

    /// Raw 16-bit read, used for the user-area slots where the stored
    /// value is a bare number rather than an instruction.
    pub fn half_at(&self, at: u16) -> Result<u16, ArenaError> {
        let b = self.slice(at, TOK_BYTES as usize)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn set_half(&mut self, at: u16, val: u16) -> Result<(), ArenaError> {
        let raw = val.to_le_bytes();
        self.slice_mut(at, TOK_BYTES as usize)?.copy_from_slice(&raw);
        Ok(())
    }

    pub fn cell_at(&self, at: u16) -> Result<i32, ArenaError> {
        let b = self.slice(at, CELL_BYTES as usize)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn set_cell(&mut self, at: u16, val: i32) -> Result<(), ArenaError> {
        let raw = val.to_le_bytes();
        self.slice_mut(at, CELL_BYTES as usize)?.copy_from_slice(&raw);
        Ok(())
    }

    /// The NUL-terminated string starting at `at`.
    pub fn cstr_at(&self, at: u16) -> Result<&str, ArenaError> {
        let start = at as usize;
        if start >= self.buf.len() {
            return Err(ArenaError::OutOfBounds);
        }
        let rest = &self.buf[start..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ArenaError::OutOfBounds)?;
        core::str::from_utf8(&rest[..len]).map_err(|_| ArenaError::BadUtf8)
    }

    /// An exact-length string view, for callers that carry `(addr, len)`.
    pub fn str_at(&self, at: u16, len: usize) -> Result<&str, ArenaError> {
        let b = self.slice(at, len)?;
        core::str::from_utf8(b).map_err(|_| ArenaError::BadUtf8)
    }

    pub fn bytes_at(&self, at: u16, len: usize) -> Result<&[u8], ArenaError> {
        self.slice(at, len)
    }

    /// Rewinds the allocation point. The reserved user area can never be
    /// reclaimed.
    pub fn truncate(&mut self, to: u16) -> Result<(), ArenaError> {
        if to < USER_AREA {
            return Err(ArenaError::TruncateIntoReserved);
        }
        if to > self.here {
            return Err(ArenaError::OutOfBounds);
        }
        self.here = to;
        Ok(())
    }

    fn slice(&self, at: u16, len: usize) -> Result<&[u8], ArenaError> {
        let start = at as usize;
        let end = start.checked_add(len).ok_or(ArenaError::OutOfBounds)?;
        self.buf.get(start..end).ok_or(ArenaError::OutOfBounds)
    }

    fn slice_mut(&mut self, at: u16, len: usize) -> Result<&mut [u8], ArenaError> {
        let start = at as usize;
        let end = start.checked_add(len).ok_or(ArenaError::OutOfBounds)?;
        self.buf.get_mut(start..end).ok_or(ArenaError::OutOfBounds)
    }
}

#[cfg(test)]
pub mod test {
    use super::{ArenaError, Pmem};
    use crate::token::{Prim, Token, USER_AREA};

    #[test]
    fn append_and_read_back() {
        let mut p = Pmem::new(256);
        let t = p.push_tok(Token::Prim(Prim::Lit)).unwrap();
        let c = p.push_cell(-42).unwrap();
        assert_eq!(p.tok_at(t).unwrap(), Token::Prim(Prim::Lit));
        assert_eq!(p.cell_at(c).unwrap(), -42);
        assert_eq!(p.here(), 6);
    }

    #[test]
    fn strings_align_to_token_units() {
        let mut p = Pmem::new(256);
        let a = p.push_str("hi").unwrap();
        assert_eq!(p.here() % 2, 0);
        assert_eq!(p.cstr_at(a).unwrap(), "hi");
        assert_eq!(Pmem::aligned_strlen("hi"), 4);
        assert_eq!(Pmem::aligned_strlen("cat"), 4);
    }

    #[test]
    fn truncate_protects_user_area() {
        let mut p = Pmem::new(256);
        p.push_bytes(&[0xff; USER_AREA as usize + 8]).unwrap();
        assert_eq!(
            p.truncate(USER_AREA - 2),
            Err(ArenaError::TruncateIntoReserved)
        );
        assert!(p.truncate(USER_AREA).is_ok());
        assert_eq!(p.here(), USER_AREA);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut p = Pmem::new(4);
        assert!(p.push_cell(1).is_ok());
        assert_eq!(p.push_cell(2), Err(ArenaError::OutOfMemory));
    }
}
