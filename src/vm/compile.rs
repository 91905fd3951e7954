//! Colon compiler, control-flow immediates, and the introspection words
//! (`see`, `words`, `dump`, `forget`, `boot`, `js`).
//!
//! Control-flow words are immediates that run at compile time. They emit
//! branch primitives with placeholder targets and carry open patch sites
//! on the value stack, so `if`/`begin`/`for` push an address and
//! `then`/`until`/`next` consume one. Back-patching writes the final
//! target into the reserved slot once it is known.

use core::fmt::Write;

use tracing::debug;

use crate::{
    arena::Pmem,
    dict::{DictError, Entry, ExecToken},
    host::Host,
    name::Name,
    output::fmt_radix,
    token::{Prim, Token, CELL_BYTES, TOK_BYTES, USER_AREA},
    Error, Forth, Mode, State,
};

impl<H: Host + 'static> Forth<H> {
    pub(crate) fn add_tok(&mut self, tok: Token) -> Result<u16, Error> {
        Ok(self.pmem.push_tok(tok)?)
    }

    /// Emits a reference to the dictionary entry at `w`: colon words
    /// compile as their body offset, builtins as their table index.
    pub(crate) fn compile_ref(&mut self, w: u16) -> Result<(), Error> {
        let entry = self
            .dict
            .get(w as usize)
            .ok_or(Error::Dict(DictError::IndexOutOfRange))?;
        let tok = match entry.exec {
            ExecToken::Colon { pfa } => Token::Colon(pfa),
            ExecToken::Builtin(_) => Token::Builtin(w),
        };
        self.add_tok(tok)?;
        Ok(())
    }

    /// Patches the branch slot at `at` to the current allocation point.
    fn setjmp(&mut self, at: u16) -> Result<(), Error> {
        let here = self.pmem.here();
        Ok(self.pmem.set_half(at, here)?)
    }

    /// Starts a new dictionary entry named by the next input word. The
    /// name goes into the arena first; the body starts right after it.
    /// Returns `false` (after a diagnostic) when no name is present.
    fn def_word(&mut self) -> Result<bool, Error> {
        let name = self.next_idiom().unwrap_or_default();
        if name.is_empty() {
            self.output.push_str(" name?\n")?;
            return Ok(false);
        }
        if self.dict.find(&self.pmem, &name).is_some() {
            write!(self.output, "{name} reDef? \n")?;
        }
        let addr = self.pmem.push_str(&name)?;
        let pfa = self.pmem.here();
        debug!(word = %name, pfa, "defining");
        self.dict.push(Entry {
            name: Name::new_arena(&name, addr),
            exec: ExecToken::Colon { pfa },
            immediate: false,
        })?;
        Ok(true)
    }

    /// Defines a word whose body is written in one go. If the body fails
    /// partway (underflow, arena exhaustion), the half-built entry is
    /// retracted so no findable word is left pointing at a truncated body.
    fn def_with(&mut self, body: fn(&mut Self) -> Result<(), Error>) -> Result<(), Error> {
        if !self.def_word()? {
            return Ok(());
        }
        let res = body(self);
        if res.is_err() {
            self.retract_def();
        }
        res
    }

    /// Drops the newest entry and rewinds the arena to its name bytes.
    fn retract_def(&mut self) {
        if let Some(entry) = self.dict.pop() {
            if let Some(addr) = entry.name.arena_addr() {
                let _ = self.pmem.truncate(addr);
            }
        }
    }

    pub fn colon(&mut self) -> Result<(), Error> {
        let ok = self.def_word()?;
        self.mode = if ok { Mode::Compile } else { Mode::Run };
        Ok(())
    }

    pub fn semicolon(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Exit))?;
        self.mode = Mode::Run;
        Ok(())
    }

    pub fn variable(&mut self) -> Result<(), Error> {
        self.def_with(|vm| {
            vm.add_tok(Token::Prim(Prim::Var))?;
            vm.pmem.push_cell(0)?;
            Ok(())
        })
    }

    pub fn constant(&mut self) -> Result<(), Error> {
        self.def_with(|vm| {
            vm.add_tok(Token::Prim(Prim::Lit))?;
            let v = vm.pop()?;
            vm.pmem.push_cell(v)?;
            vm.add_tok(Token::Prim(Prim::Exit))?;
            Ok(())
        })
    }

    pub fn immediate(&mut self) -> Result<(), Error> {
        self.dict.last_mut().immediate = true;
        Ok(())
    }

    pub fn create(&mut self) -> Result<(), Error> {
        self.def_with(|vm| {
            vm.add_tok(Token::Prim(Prim::VBran))?;
            // Branch slot, patched by a later does>
            vm.pmem.push_half(0)?;
            Ok(())
        })
    }

    pub fn does(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Does))?;
        Ok(())
    }

    /// `to` and `is` name their target in the source at compile/interpret
    /// time but receive it on the stack when running compiled.
    fn meta_target(&mut self) -> Result<Option<u16>, Error> {
        if self.state == State::Query {
            let name = match self.next_idiom() {
                Some(n) => n,
                None => return Ok(None),
            };
            Ok(self.dict.find(&self.pmem, &name))
        } else {
            Ok(Some(self.pop()? as u16))
        }
    }

    pub fn to(&mut self) -> Result<(), Error> {
        let w = match self.meta_target()? {
            Some(w) if w != 0 => w,
            _ => return Ok(()),
        };
        if self.mode == Mode::Compile {
            self.add_tok(Token::Prim(Prim::Lit))?;
            self.pmem.push_cell(w as i32)?;
            let myself = self
                .dict
                .find(&self.pmem, "to")
                .ok_or(Error::InternalError)?;
            self.compile_ref(myself)?;
        } else {
            let pfa = match self.dict.get(w as usize).map(|e| e.exec) {
                Some(ExecToken::Colon { pfa }) => pfa,
                _ => return Ok(()),
            };
            let v = self.pop()?;
            // Constant body is [Lit][cell][Exit]; rewrite the cell.
            self.pmem.set_cell(pfa + TOK_BYTES, v)?;
        }
        Ok(())
    }

    pub fn is(&mut self) -> Result<(), Error> {
        let w = match self.meta_target()? {
            Some(w) if w != 0 => w,
            _ => return Ok(()),
        };
        if self.mode == Mode::Compile {
            self.add_tok(Token::Prim(Prim::Lit))?;
            self.pmem.push_cell(w as i32)?;
            let myself = self
                .dict
                .find(&self.pmem, "is")
                .ok_or(Error::InternalError)?;
            self.compile_ref(myself)?;
        } else {
            let exec = self
                .dict
                .get(w as usize)
                .ok_or(Error::Dict(DictError::IndexOutOfRange))?
                .exec;
            let tgt = self.pop()? as usize;
            match self.dict.get_mut(tgt) {
                Some(entry) => entry.exec = exec,
                None => return Err(Error::Dict(DictError::IndexOutOfRange)),
            }
        }
        Ok(())
    }

    // branching

    pub fn if_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::ZBran))?;
        let here = self.pmem.here();
        self.push(here as i32)?;
        self.pmem.push_half(0)?;
        Ok(())
    }

    pub fn else_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Bran))?;
        let h = self.pmem.here();
        self.pmem.push_half(0)?;
        let at = self.pop()? as u16;
        self.setjmp(at)?;
        self.push(h as i32)
    }

    pub fn then(&mut self) -> Result<(), Error> {
        let at = self.pop()? as u16;
        self.setjmp(at)
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        let here = self.pmem.here();
        self.push(here as i32)
    }

    pub fn again(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Bran))?;
        let t = self.pop()? as u16;
        self.pmem.push_half(t)?;
        Ok(())
    }

    pub fn until(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::ZBran))?;
        let t = self.pop()? as u16;
        self.pmem.push_half(t)?;
        Ok(())
    }

    pub fn while_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::ZBran))?;
        let here = self.pmem.here();
        self.push(here as i32)?;
        self.pmem.push_half(0)?;
        Ok(())
    }

    pub fn repeat(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Bran))?;
        let exit_slot = self.pop()? as u16;
        let back = self.pop()? as u16;
        self.pmem.push_half(back)?;
        self.setjmp(exit_slot)
    }

    pub fn for_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::For))?;
        let here = self.pmem.here();
        self.push(here as i32)
    }

    pub fn next_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Next))?;
        let t = self.pop()? as u16;
        self.pmem.push_half(t)?;
        Ok(())
    }

    pub fn aft(&mut self) -> Result<(), Error> {
        // Replaces for's loop-back point: first pass branches over the
        // skipped section, later passes re-enter at the new point.
        self.pop()?;
        self.add_tok(Token::Prim(Prim::Bran))?;
        let h = self.pmem.here();
        self.pmem.push_half(0)?;
        let here = self.pmem.here();
        self.push(here as i32)?;
        self.push(h as i32)
    }

    pub fn do_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Do))?;
        let here = self.pmem.here();
        self.push(here as i32)
    }

    pub fn loop_(&mut self) -> Result<(), Error> {
        self.add_tok(Token::Prim(Prim::Loop))?;
        let t = self.pop()? as u16;
        self.pmem.push_half(t)?;
        Ok(())
    }

    /// `s"` and `."`. Compiled, the payload is embedded after the opcode;
    /// interpreted, the text is staged past `here` and the allocation
    /// point restored, leaving a transient (addr, len) pair.
    pub(crate) fn string_literal(&mut self, op: Prim) -> Result<(), Error> {
        let s = self.source.scan(b'"').to_owned();
        if self.mode == Mode::Compile {
            self.add_tok(Token::Prim(op))?;
            self.pmem.push_str(&s)?;
        } else {
            let h0 = self.pmem.here();
            let addr = self.pmem.push_str(&s)?;
            self.push(addr as i32)?;
            self.push(s.len() as i32)?;
            self.pmem.truncate(h0)?;
        }
        Ok(())
    }

    // introspection

    pub fn words(&mut self) -> Result<(), Error> {
        const WIDTH: usize = 60;
        let names: Vec<String> = (1..self.dict.len())
            .filter_map(|i| self.dict.get(i))
            .map(|e| e.name.resolve(&self.pmem).to_owned())
            .collect();
        let mut sz = 0;
        for name in names {
            sz += name.len() + 2;
            write!(self.output, "  {name}")?;
            if sz > WIDTH {
                sz = 0;
                self.output.push_str("\n")?;
            }
        }
        self.output.push_str("\n")?;
        Ok(())
    }

    pub fn see(&mut self) -> Result<(), Error> {
        let name = match self.next_idiom() {
            Some(n) => n,
            None => return Ok(()),
        };
        let w = match self.dict.find(&self.pmem, &name) {
            Some(w) => w,
            None => return Ok(()),
        };
        let (shown, body) = match self.dict.get(w as usize) {
            Some(e) => (e.name.resolve(&self.pmem).to_owned(), e.exec),
            None => return Ok(()),
        };
        write!(self.output, ": {shown}")?;
        match body {
            ExecToken::Colon { pfa } => self.see_body(pfa)?,
            ExecToken::Builtin(_) => self.output.push_str(" ( built-ins ) ;")?,
        }
        self.output.push_str("\n")?;
        Ok(())
    }

    /// Walks a compiled body token by token, one instruction per line.
    fn see_body(&mut self, pfa: u16) -> Result<(), Error> {
        let base = self.radix();
        let mut ip = pfa;
        loop {
            let tok = match self.pmem.tok_at(ip) {
                Ok(t) => t,
                Err(_) => return Ok(()),
            };
            let opnd = ip + TOK_BYTES;
            self.output.push_str("\n  ")?;
            match tok {
                Token::Prim(Prim::Lit) => {
                    let v = self.pmem.cell_at(opnd)?;
                    write!(self.output, "{} ( lit )", fmt_radix(v, base))?;
                    ip = opnd + CELL_BYTES;
                }
                Token::Prim(Prim::Str) => {
                    let s = self.pmem.cstr_at(opnd)?.to_owned();
                    let skip = Pmem::aligned_strlen(&s);
                    write!(self.output, "s\" {s}\"")?;
                    ip = opnd + skip;
                }
                Token::Prim(Prim::DotQ) => {
                    let s = self.pmem.cstr_at(opnd)?.to_owned();
                    let skip = Pmem::aligned_strlen(&s);
                    write!(self.output, ".\" {s}\"")?;
                    ip = opnd + skip;
                }
                Token::Prim(Prim::Var) => {
                    self.see_var_data(pfa, opnd, base)?;
                    self.output.push_str("var")?;
                    return Ok(());
                }
                Token::Prim(Prim::VBran) => {
                    let target = self.pmem.half_at(opnd)?;
                    self.see_var_data(pfa, opnd + TOK_BYTES, base)?;
                    write!(self.output, "vbran {target:04x}")?;
                    if target == 0 {
                        return Ok(());
                    }
                    ip = target;
                }
                Token::Prim(p @ (Prim::Bran | Prim::ZBran | Prim::Next | Prim::Loop)) => {
                    let target = self.pmem.half_at(opnd)?;
                    write!(
                        self.output,
                        "{} {target:04x}",
                        Prim::NAMES[p as u16 as usize]
                    )?;
                    ip = opnd + TOK_BYTES;
                }
                Token::Prim(Prim::Exit) => {
                    self.output.push_str(";")?;
                    return Ok(());
                }
                Token::Prim(p) => {
                    self.output.push_str(Prim::NAMES[p as u16 as usize])?;
                    ip = opnd;
                }
                Token::Builtin(idx) => {
                    let name = match self.dict.get(idx as usize) {
                        Some(e) => e.name.resolve(&self.pmem).to_owned(),
                        None => return Ok(()),
                    };
                    self.output.push_str(&name)?;
                    ip = opnd;
                }
                Token::Colon(body) => {
                    let found = (1..self.dict.len()).rev().find(|&i| {
                        matches!(
                            self.dict.get(i).map(|e| e.exec),
                            Some(ExecToken::Colon { pfa: p }) if p == body
                        )
                    });
                    let name = match found {
                        Some(i) => match self.dict.get(i) {
                            Some(e) => e.name.resolve(&self.pmem).to_owned(),
                            None => return Ok(()),
                        },
                        None => return Ok(()),
                    };
                    self.output.push_str(&name)?;
                    ip = opnd;
                }
            }
        }
    }

    /// Prints the data cells of a `variable`/`create` body. Their extent
    /// runs to the next word's name bytes (or `here` for the newest).
    fn see_var_data(&mut self, pfa: u16, data_at: u16, base: u32) -> Result<(), Error> {
        let idx = (1..self.dict.len()).rev().find(|&i| {
            matches!(
                self.dict.get(i).map(|e| e.exec),
                Some(ExecToken::Colon { pfa: p }) if p == pfa
            )
        });
        let idx = match idx {
            Some(i) => i,
            None => return Ok(()),
        };
        let end = self
            .dict
            .get(idx + 1)
            .and_then(|e| e.name.arena_addr())
            .unwrap_or_else(|| self.pmem.here());
        let mut at = data_at;
        while at + CELL_BYTES <= end {
            let v = self.pmem.cell_at(at)?;
            write!(self.output, "{} ", fmt_radix(v, base))?;
            at += CELL_BYTES;
        }
        Ok(())
    }

    pub fn dump(&mut self) -> Result<(), Error> {
        let n = self.pop()? as u16;
        let a = self.pop()? as u16;
        let start = a & !0xf;
        let end = (a.saturating_add(n)) & !0xf;
        let mut row = start;
        loop {
            let bytes: Vec<u8> = match self.pmem.bytes_at(row, 16) {
                Ok(b) => b.to_vec(),
                Err(_) => break,
            };
            write!(self.output, "{row:04x}: ")?;
            for (j, b) in bytes.iter().enumerate() {
                write!(self.output, "{b:02x}")?;
                if j % 4 == 3 {
                    self.output.push_str(" ")?;
                }
            }
            for b in &bytes {
                let c = b & 0x7f;
                let c = if c == 0x7f || c < 0x20 { '_' } else { c as char };
                self.output.push_char(c)?;
            }
            self.output.push_str("\n")?;
            if row >= end {
                break;
            }
            row += 16;
        }
        Ok(())
    }

    pub fn forget(&mut self) -> Result<(), Error> {
        let name = match self.next_idiom() {
            Some(n) => n,
            None => return Ok(()),
        };
        let w = match self.dict.find(&self.pmem, &name) {
            Some(w) => w as usize,
            None => return Ok(()),
        };
        let fence = self.dict.fence();
        debug!(word = %name, idx = w, fence, "forget");
        if w >= fence {
            if let Some(addr) = self.dict.truncate(w) {
                self.pmem.truncate(addr)?;
            }
        } else {
            self.dict.truncate(fence);
            self.pmem.truncate(USER_AREA)?;
        }
        Ok(())
    }

    pub fn boot(&mut self) -> Result<(), Error> {
        debug!("boot: dropping all user definitions");
        self.dict.truncate(self.dict.fence());
        self.pmem.truncate(USER_AREA)?;
        Ok(())
    }

    // native bridge

    /// `js` ( n addr u -- ): renders the template string at `addr` with
    /// printf-style specifiers, popping one stack argument per specifier
    /// from right to left, then hands the result to the host.
    pub fn js(&mut self) -> Result<(), Error> {
        let _len = self.pop()?;
        let addr = self.pop()? as u16;
        let mut pad = self.pmem.cstr_at(addr)?.to_owned();
        let mut search_end = pad.len();
        while let Some(at) = pad[..search_end].rfind('%') {
            if at > 0 && pad.as_bytes()[at - 1] == b'%' {
                pad.replace_range(at - 1..at, "");
                search_end = at - 1;
            } else {
                // Only an ASCII byte can follow the specifier; anything
                // else renders as the unknown-specifier marker.
                let spec = pad.as_bytes().get(at + 1).copied().filter(u8::is_ascii);
                let end = if spec.is_some() { at + 2 } else { at + 1 };
                let rep = self.js_arg(spec)?;
                pad.replace_range(at..end, &rep);
                search_end = at;
            }
        }
        self.host.dispatch(&pad);
        Ok(())
    }

    fn js_arg(&mut self, spec: Option<u8>) -> Result<String, Error> {
        Ok(match spec {
            Some(b'd') => format!("{}", self.pop()?),
            Some(b'f') => format!("{}", self.pop()?),
            Some(b'x') => format!("0x{:x}", self.pop()? as u32),
            Some(b's') => {
                let _l = self.pop()?;
                let a = self.pop()? as u16;
                self.pmem.cstr_at(a)?.to_owned()
            }
            Some(b'p') => {
                let a = self.pop()? as u32;
                let l = self.pop()? as u32;
                format!("p {a} {l}")
            }
            Some(c) => format!("{}?", c as char),
            None => "?".to_owned(),
        })
    }
}
