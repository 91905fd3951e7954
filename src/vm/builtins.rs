use core::fmt::Write;

use crate::{
    dict::BuiltinEntry,
    host::Host,
    output::{fmt_radix, fmt_radix_u},
    token::{Prim, Token, CELL_BYTES, USER_AREA},
    vm::BASE_ADDR,
    Error, Forth, Mode, State,
};

macro_rules! builtin {
    ($name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            immediate: false,
        }
    };
}

macro_rules! immediate {
    ($name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            immediate: true,
        }
    };
}

impl<H: Host + 'static> Forth<H> {
    /// The complete builtin word set, in dictionary order. Compiled
    /// references index this table directly, so entries must never be
    /// reordered once scripts are compiled against it.
    pub const BUILTINS: &'static [BuiltinEntry<H>] = &[
        // stack
        builtin!("dup", Self::dup),
        builtin!("drop", Self::drop_),
        builtin!("over", Self::over),
        builtin!("swap", Self::swap),
        builtin!("rot", Self::rot),
        builtin!("-rot", Self::minus_rot),
        builtin!("nip", Self::nip),
        builtin!("pick", Self::pick),
        builtin!("2dup", Self::two_dup),
        builtin!("2drop", Self::two_drop),
        builtin!("2over", Self::two_over),
        builtin!("2swap", Self::two_swap),
        builtin!("?dup", Self::question_dup),
        // alu
        builtin!("+", Self::add),
        builtin!("*", Self::mul),
        builtin!("-", Self::sub),
        builtin!("/", Self::div),
        builtin!("mod", Self::modu),
        builtin!("*/", Self::mul_div),
        builtin!("/mod", Self::div_mod),
        builtin!("*/mod", Self::mul_div_mod),
        builtin!("and", Self::bit_and),
        builtin!("or", Self::bit_or),
        builtin!("xor", Self::bit_xor),
        builtin!("abs", Self::abs),
        builtin!("negate", Self::negate),
        builtin!("invert", Self::invert),
        builtin!("rshift", Self::rshift),
        builtin!("lshift", Self::lshift),
        builtin!("max", Self::max),
        builtin!("min", Self::min),
        builtin!("2*", Self::two_mul),
        builtin!("2/", Self::two_div),
        builtin!("1+", Self::one_plus),
        builtin!("1-", Self::one_minus),
        // comparison
        builtin!("0=", Self::zero_eq),
        builtin!("0<", Self::zero_lt),
        builtin!("0>", Self::zero_gt),
        builtin!("=", Self::eq),
        builtin!(">", Self::gt),
        builtin!("<", Self::lt),
        builtin!("<>", Self::ne),
        builtin!(">=", Self::ge),
        builtin!("<=", Self::le),
        builtin!("u<", Self::u_lt),
        builtin!("u>", Self::u_gt),
        // io
        builtin!("case!", Self::case_store),
        builtin!("base", Self::base),
        builtin!("decimal", Self::decimal),
        builtin!("hex", Self::hex),
        builtin!("bl", Self::bl),
        builtin!("cr", Self::cr),
        builtin!(".", Self::pop_print),
        builtin!("u.", Self::u_print),
        builtin!(".r", Self::dot_r),
        builtin!("u.r", Self::u_dot_r),
        builtin!("type", Self::type_),
        immediate!("key", Self::key),
        builtin!("emit", Self::emit),
        builtin!("space", Self::space),
        builtin!("spaces", Self::spaces),
        // literals and comments
        builtin!("[", Self::interpret_on),
        builtin!("]", Self::compile_on),
        immediate!("(", Self::paren),
        immediate!(".(", Self::dot_paren),
        immediate!("\\", Self::backslash),
        immediate!("s\"", Self::s_quote),
        immediate!(".\"", Self::dot_quote),
        // branching
        immediate!("if", Self::if_),
        immediate!("else", Self::else_),
        immediate!("then", Self::then),
        immediate!("begin", Self::begin),
        immediate!("again", Self::again),
        immediate!("until", Self::until),
        immediate!("while", Self::while_),
        immediate!("repeat", Self::repeat),
        immediate!("for", Self::for_),
        immediate!("next", Self::next_),
        immediate!("aft", Self::aft),
        immediate!("do", Self::do_),
        builtin!("i", Self::loop_i),
        builtin!("leave", Self::leave),
        immediate!("loop", Self::loop_),
        // return stack
        builtin!(">r", Self::to_r),
        builtin!("r>", Self::r_from),
        builtin!("r@", Self::r_fetch),
        // compiler
        builtin!(":", Self::colon),
        immediate!(";", Self::semicolon),
        builtin!("exit", Self::exit),
        builtin!("variable", Self::variable),
        builtin!("constant", Self::constant),
        immediate!("immediate", Self::immediate),
        // metacompiler
        builtin!("exec", Self::exec_word),
        builtin!("create", Self::create),
        immediate!("does>", Self::does),
        immediate!("to", Self::to),
        immediate!("is", Self::is),
        // memory
        builtin!("@", Self::fetch),
        builtin!("!", Self::store),
        builtin!(",", Self::comma),
        builtin!("n,", Self::n_comma),
        builtin!("cells", Self::cells),
        builtin!("allot", Self::allot),
        builtin!("th", Self::th),
        builtin!("+!", Self::plus_store),
        builtin!("?", Self::question),
        // debug
        builtin!("abort", Self::abort),
        builtin!("here", Self::here_word),
        builtin!("'", Self::tick),
        builtin!(".s", Self::ss_dump),
        builtin!("depth", Self::depth_word),
        builtin!("r", Self::rs_depth),
        builtin!("words", Self::words),
        builtin!("see", Self::see),
        builtin!("dump", Self::dump),
        builtin!("forget", Self::forget),
        // os
        builtin!("mstat", Self::mstat),
        builtin!("ms", Self::ms),
        builtin!("rnd", Self::rnd),
        builtin!("included", Self::included),
        builtin!("js", Self::js),
        builtin!("boot", Self::boot),
    ];

    // stack

    pub fn dup(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.push(self.top)
    }

    pub fn drop_(&mut self) -> Result<(), Error> {
        self.top = self.ss.try_pop()?;
        Ok(())
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let v = self.peek_ss(0)?;
        self.push(v)
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        let t = core::mem::replace(&mut self.top, n);
        self.ss.push(t)?;
        Ok(())
    }

    pub fn rot(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        let m = self.pop_ss()?;
        self.ss.push(n)?;
        self.push(m)
    }

    pub fn minus_rot(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        let m = self.pop_ss()?;
        self.push(m)?;
        let t = core::mem::replace(&mut self.top, n);
        self.ss.push(t)?;
        Ok(())
    }

    pub fn nip(&mut self) -> Result<(), Error> {
        self.pop_ss()?;
        Ok(())
    }

    pub fn pick(&mut self) -> Result<(), Error> {
        let i = self.top;
        if i < 0 {
            return Err(Error::Stack(crate::stack::StackError::StackEmpty));
        }
        self.top = self.peek_ss(i as usize)?;
        Ok(())
    }

    pub fn two_dup(&mut self) -> Result<(), Error> {
        self.over()?;
        self.over()
    }

    pub fn two_drop(&mut self) -> Result<(), Error> {
        self.pop()?;
        self.pop()?;
        Ok(())
    }

    pub fn two_over(&mut self) -> Result<(), Error> {
        let a = self.peek_ss(2)?;
        self.push(a)?;
        let b = self.peek_ss(2)?;
        self.push(b)
    }

    pub fn two_swap(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        let m = self.pop_ss()?;
        let l = self.pop_ss()?;
        self.ss.push(n)?;
        self.push(l)?;
        // top slides down into ss, then m goes on top
        let t = core::mem::replace(&mut self.top, m);
        self.ss.push(t)?;
        Ok(())
    }

    pub fn question_dup(&mut self) -> Result<(), Error> {
        self.need(1)?;
        if self.top != 0 {
            self.push(self.top)?;
        }
        Ok(())
    }

    // alu

    pub fn add(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = self.top.wrapping_add(n);
        Ok(())
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = self.top.wrapping_mul(n);
        Ok(())
    }

    pub fn sub(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = n.wrapping_sub(self.top);
        Ok(())
    }

    pub fn div(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        if self.top == 0 {
            return Err(Error::DivideByZero);
        }
        self.top = n.wrapping_div(self.top);
        Ok(())
    }

    pub fn modu(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        if self.top == 0 {
            return Err(Error::DivideByZero);
        }
        self.top = n.wrapping_rem(self.top);
        Ok(())
    }

    pub fn mul_div(&mut self) -> Result<(), Error> {
        let b = self.pop_ss()?;
        let a = self.pop_ss()?;
        if self.top == 0 {
            return Err(Error::DivideByZero);
        }
        self.top = ((b as i64 * a as i64) / self.top as i64) as i32;
        Ok(())
    }

    pub fn div_mod(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        let t = self.top;
        if t == 0 {
            return Err(Error::DivideByZero);
        }
        self.ss.push(n.wrapping_rem(t))?;
        self.top = n.wrapping_div(t);
        Ok(())
    }

    pub fn mul_div_mod(&mut self) -> Result<(), Error> {
        let b = self.pop_ss()?;
        let a = self.pop_ss()?;
        let t = self.top as i64;
        if t == 0 {
            return Err(Error::DivideByZero);
        }
        let n = b as i64 * a as i64;
        self.ss.push((n % t) as i32)?;
        self.top = (n / t) as i32;
        Ok(())
    }

    pub fn bit_and(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top &= n;
        Ok(())
    }

    pub fn bit_or(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top |= n;
        Ok(())
    }

    pub fn bit_xor(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top ^= n;
        Ok(())
    }

    pub fn abs(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_abs();
        Ok(())
    }

    pub fn negate(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_neg();
        Ok(())
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = !self.top;
        Ok(())
    }

    pub fn rshift(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()? as u32;
        self.top = n.checked_shr(self.top as u32).unwrap_or(0) as i32;
        Ok(())
    }

    pub fn lshift(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()? as u32;
        self.top = n.checked_shl(self.top as u32).unwrap_or(0) as i32;
        Ok(())
    }

    pub fn max(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = self.top.max(n);
        Ok(())
    }

    pub fn min(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = self.top.min(n);
        Ok(())
    }

    pub fn two_mul(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_mul(2);
        Ok(())
    }

    pub fn two_div(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top /= 2;
        Ok(())
    }

    pub fn one_plus(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_add(1);
        Ok(())
    }

    pub fn one_minus(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_sub(1);
        Ok(())
    }

    // comparison, -1 is true

    fn flag(b: bool) -> i32 {
        if b {
            -1
        } else {
            0
        }
    }

    pub fn zero_eq(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = Self::flag(self.top == 0);
        Ok(())
    }

    pub fn zero_lt(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = Self::flag(self.top < 0);
        Ok(())
    }

    pub fn zero_gt(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = Self::flag(self.top > 0);
        Ok(())
    }

    pub fn eq(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n == self.top);
        Ok(())
    }

    pub fn gt(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n > self.top);
        Ok(())
    }

    pub fn lt(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n < self.top);
        Ok(())
    }

    pub fn ne(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n != self.top);
        Ok(())
    }

    pub fn ge(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n >= self.top);
        Ok(())
    }

    pub fn le(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag(n <= self.top);
        Ok(())
    }

    pub fn u_lt(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag((n as u32) < (self.top as u32));
        Ok(())
    }

    pub fn u_gt(&mut self) -> Result<(), Error> {
        let n = self.pop_ss()?;
        self.top = Self::flag((n as u32) > (self.top as u32));
        Ok(())
    }

    // io

    pub fn case_store(&mut self) -> Result<(), Error> {
        // 0 selects case-insensitive search
        self.dict.relaxed = self.pop()? == 0;
        Ok(())
    }

    pub fn base(&mut self) -> Result<(), Error> {
        self.push(BASE_ADDR as i32)
    }

    pub fn decimal(&mut self) -> Result<(), Error> {
        self.pmem.set_half(BASE_ADDR, 10)?;
        Ok(())
    }

    pub fn hex(&mut self) -> Result<(), Error> {
        self.pmem.set_half(BASE_ADDR, 16)?;
        Ok(())
    }

    pub fn bl(&mut self) -> Result<(), Error> {
        self.output.push_str(" ")?;
        Ok(())
    }

    pub fn cr(&mut self) -> Result<(), Error> {
        self.output.push_str("\n")?;
        Ok(())
    }

    pub fn pop_print(&mut self) -> Result<(), Error> {
        let v = self.pop()?;
        let b = self.radix();
        write!(self.output, "{} ", fmt_radix(v, b))?;
        Ok(())
    }

    pub fn u_print(&mut self) -> Result<(), Error> {
        let v = self.pop()? as u32;
        let b = self.radix();
        write!(self.output, "{} ", fmt_radix_u(v, b))?;
        Ok(())
    }

    pub fn dot_r(&mut self) -> Result<(), Error> {
        let w = self.pop()?.max(0) as usize;
        let v = self.pop()?;
        let b = self.radix();
        write!(self.output, "{:>w$}", fmt_radix(v, b))?;
        Ok(())
    }

    pub fn u_dot_r(&mut self) -> Result<(), Error> {
        let w = self.pop()?.max(0) as usize;
        let v = self.pop()? as u32;
        let b = self.radix();
        write!(self.output, "{:>w$}", fmt_radix_u(v, b))?;
        Ok(())
    }

    pub fn type_(&mut self) -> Result<(), Error> {
        let _len = self.pop()?;
        let addr = self.pop()? as u16;
        let s = self.pmem.cstr_at(addr)?.to_owned();
        self.output.push_str(&s)?;
        Ok(())
    }

    pub fn key(&mut self) -> Result<(), Error> {
        if self.mode == Mode::Compile {
            self.add_tok(Token::Prim(Prim::Key))?;
        } else {
            self.request_key();
        }
        Ok(())
    }

    pub fn emit(&mut self) -> Result<(), Error> {
        let v = self.pop()?;
        let c = char::from_u32(v as u32).unwrap_or('?');
        self.output.push_char(c)?;
        Ok(())
    }

    pub fn space(&mut self) -> Result<(), Error> {
        self.output.push_str(" ")?;
        Ok(())
    }

    pub fn spaces(&mut self) -> Result<(), Error> {
        let n = self.pop()?;
        for _ in 0..n.max(0) {
            self.output.push_str(" ")?;
        }
        Ok(())
    }

    // literals and comments

    pub fn interpret_on(&mut self) -> Result<(), Error> {
        self.mode = Mode::Run;
        Ok(())
    }

    pub fn compile_on(&mut self) -> Result<(), Error> {
        self.mode = Mode::Compile;
        Ok(())
    }

    pub fn paren(&mut self) -> Result<(), Error> {
        self.source.scan(b')');
        Ok(())
    }

    pub fn dot_paren(&mut self) -> Result<(), Error> {
        let s = self.source.scan(b')').to_owned();
        self.output.push_str(&s)?;
        Ok(())
    }

    pub fn backslash(&mut self) -> Result<(), Error> {
        self.source.drain();
        Ok(())
    }

    pub fn s_quote(&mut self) -> Result<(), Error> {
        self.string_literal(Prim::Str)
    }

    pub fn dot_quote(&mut self) -> Result<(), Error> {
        self.string_literal(Prim::DotQ)
    }

    // loops and return stack

    pub fn loop_i(&mut self) -> Result<(), Error> {
        let v = self.rs.try_peek()?;
        self.push(v)
    }

    pub fn leave(&mut self) -> Result<(), Error> {
        self.rs.try_pop()?;
        self.rs.try_pop()?;
        self.unnest()
    }

    pub fn to_r(&mut self) -> Result<(), Error> {
        let v = self.pop()?;
        self.rs.push(v)?;
        Ok(())
    }

    pub fn r_from(&mut self) -> Result<(), Error> {
        let v = self.rs.try_pop()?;
        self.push(v)
    }

    pub fn r_fetch(&mut self) -> Result<(), Error> {
        let v = self.rs.try_peek()?;
        self.push(v)
    }

    pub fn exit(&mut self) -> Result<(), Error> {
        self.unnest()
    }

    // metacompiler

    /// Runs the word whose dictionary index is on the stack. Inside a
    /// token stream this nests in place rather than spinning up a second
    /// inner-interpreter activation, so the caller resumes normally.
    pub fn exec_word(&mut self) -> Result<(), Error> {
        let w = self.pop()?;
        if w < 0 {
            return Err(Error::Dict(crate::dict::DictError::IndexOutOfRange));
        }
        let w = w as u16;
        if self.state == State::Nest {
            let entry = self
                .dict
                .get(w as usize)
                .ok_or(Error::Dict(crate::dict::DictError::IndexOutOfRange))?;
            match entry.exec {
                crate::dict::ExecToken::Builtin(f) => f(self),
                crate::dict::ExecToken::Colon { pfa } => {
                    self.rs.push(self.ip as i32)?;
                    self.ip = pfa;
                    Ok(())
                }
            }
        } else {
            self.call(w)
        }
    }

    // memory

    pub fn fetch(&mut self) -> Result<(), Error> {
        let w = self.pop()? as u16;
        let v = if w < USER_AREA {
            self.pmem.half_at(w)? as i32
        } else {
            self.pmem.cell_at(w)?
        };
        self.push(v)
    }

    pub fn store(&mut self) -> Result<(), Error> {
        let w = self.pop()? as u16;
        let v = self.pop()?;
        if w < USER_AREA {
            self.pmem.set_half(w, v as u16)?;
        } else {
            self.pmem.set_cell(w, v)?;
        }
        Ok(())
    }

    pub fn comma(&mut self) -> Result<(), Error> {
        let v = self.pop()?;
        self.pmem.push_cell(v)?;
        Ok(())
    }

    pub fn n_comma(&mut self) -> Result<(), Error> {
        let v = self.pop()? as u16;
        self.pmem.push_bytes(&v.to_le_bytes())?;
        Ok(())
    }

    pub fn cells(&mut self) -> Result<(), Error> {
        self.need(1)?;
        self.top = self.top.wrapping_mul(CELL_BYTES as i32);
        Ok(())
    }

    pub fn allot(&mut self) -> Result<(), Error> {
        let n = self.pop()?.max(0);
        let mut i = 0;
        while i < n {
            self.pmem.push_cell(0)?;
            i += CELL_BYTES as i32;
        }
        Ok(())
    }

    pub fn th(&mut self) -> Result<(), Error> {
        self.need(2)?;
        let n = self.pop()?;
        self.top = self.top.wrapping_add(n.wrapping_mul(CELL_BYTES as i32));
        Ok(())
    }

    pub fn plus_store(&mut self) -> Result<(), Error> {
        let w = self.pop()? as u16;
        let v = self.pop()?;
        let cur = self.pmem.cell_at(w)?;
        self.pmem.set_cell(w, cur.wrapping_add(v))?;
        Ok(())
    }

    pub fn question(&mut self) -> Result<(), Error> {
        let w = self.pop()? as u16;
        let v = self.pmem.cell_at(w)?;
        let b = self.radix();
        write!(self.output, "{} ", fmt_radix(v, b))?;
        Ok(())
    }

    // debug

    pub fn abort(&mut self) -> Result<(), Error> {
        self.top = -1;
        self.ss.clear();
        self.rs.clear();
        Ok(())
    }

    pub fn here_word(&mut self) -> Result<(), Error> {
        self.push(self.pmem.here() as i32)
    }

    pub fn tick(&mut self) -> Result<(), Error> {
        let name = match self.next_idiom() {
            Some(n) => n,
            None => return Ok(()),
        };
        if let Some(w) = self.dict.find(&self.pmem, &name) {
            self.push(w as i32)?;
        }
        Ok(())
    }

    pub fn ss_dump(&mut self) -> Result<(), Error> {
        let b = self.radix();
        for v in self.stack_values() {
            write!(self.output, "{} ", fmt_radix(v, b))?;
        }
        self.output.push_str("-> ok\n")?;
        Ok(())
    }

    pub fn depth_word(&mut self) -> Result<(), Error> {
        let d = self.ss.depth() as i32;
        self.push(d)
    }

    pub fn rs_depth(&mut self) -> Result<(), Error> {
        let d = self.rs.depth() as i32;
        self.push(d)
    }

    // os

    pub fn mstat(&mut self) -> Result<(), Error> {
        write!(
            self.output,
            "eforth4 v{}\n  dict: {}/{}\n  ss  : {}/{}\n  rs  : {}/{}\n  mem : {}/{}\n",
            env!("CARGO_PKG_VERSION"),
            self.dict.len(),
            self.dict.capacity(),
            self.ss.depth(),
            self.ss.capacity(),
            self.rs.depth(),
            self.rs.capacity(),
            self.pmem.here(),
            self.pmem.capacity(),
        )?;
        Ok(())
    }

    pub fn ms(&mut self) -> Result<(), Error> {
        let t = self.host.now_ms() as i32;
        self.push(t)
    }

    pub fn rnd(&mut self) -> Result<(), Error> {
        let n = fastrand::i32(0..=i32::MAX);
        self.push(n)
    }

    pub fn included(&mut self) -> Result<(), Error> {
        let _len = self.pop()?;
        let addr = self.pop()? as u16;
        let name = self.pmem.cstr_at(addr)?.to_owned();
        self.include_source(&name)
    }
}
