use core::fmt::Write;

use tracing::{debug, trace};

use crate::{
    arena::Pmem,
    dict::{Dict, DictError, Entry, ExecToken},
    host::Host,
    input::Source,
    output::OutputBuf,
    stack::{Stack, StackError},
    token::{Prim, Token, CELL_BYTES, TOK_BYTES, USER_AREA},
    Error, Mode,
};

mod builtins;
mod compile;

/// Arena offset of the numeric radix user variable.
pub(crate) const BASE_ADDR: u16 = 0;

/// Where the interpreter stands between calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Idle, nothing pending.
    Stop,
    /// Parked mid-execution with a resumable continuation.
    Hold,
    /// Consuming input words.
    Query,
    /// Walking a token stream.
    Nest,
    /// Waiting for the host to deliver a keypress.
    Io,
}

/// What a completed `pump` call means for the embedder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VmSignal {
    /// The line ran to completion; new input may be submitted.
    Done,
    /// Execution is parked; call `pump` again (the line argument is
    /// ignored until the parked work finishes).
    Yield,
}

/// Construction-time capacities. Fixed for the life of the VM; exhaustion
/// is an error, never a reallocation.
#[derive(Debug, Copy, Clone)]
pub struct Params {
    pub data_stack_elems: usize,
    pub return_stack_elems: usize,
    pub dict_entries: usize,
    pub pmem_bytes: u16,
    pub output_bytes: usize,
    /// Wall-clock budget per `pump` call, in milliseconds.
    pub slice_ms: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            data_stack_elems: 64,
            return_stack_elems: 64,
            dict_entries: 1024,
            pmem_bytes: 0x8000,
            output_bytes: 4096,
            slice_ms: 10,
        }
    }
}

/// The whole interpreter. Every piece of mutable state lives here, so
/// independent instances are fully isolated and the embedder decides
/// where (and on which thread) each one lives.
pub struct Forth<H: 'static> {
    /// Cached top of the value stack. `-1` when the stack is empty.
    pub(crate) top: i32,
    /// Value-stack spill area; depth is its length.
    pub(crate) ss: Stack<i32>,
    /// Return stack: saved instruction pointers and loop frames.
    pub(crate) rs: Stack<i32>,
    pub(crate) pmem: Pmem,
    pub(crate) dict: Dict<H>,
    pub(crate) source: Source,
    pub(crate) output: OutputBuf,
    pub(crate) mode: Mode,
    pub(crate) state: State,
    pub(crate) ip: u16,
    deadline: u64,
    slice_ms: u64,
    pending_key: bool,
    pub(crate) host: H,
}

impl<H: Host + 'static> Forth<H> {
    pub fn new(host: H, params: Params) -> Result<Self, Error> {
        let mut pmem = Pmem::new(params.pmem_bytes);
        // User area: radix, numeric-format flag, then padding.
        pmem.push_bytes(&10u16.to_le_bytes())?;
        pmem.push_bytes(&0u16.to_le_bytes())?;
        while pmem.here() < USER_AREA {
            pmem.push_bytes(&0xffffu16.to_le_bytes())?;
        }

        let mut dict = Dict::new(params.dict_entries);
        for def in Self::BUILTINS {
            dict.push(Entry {
                name: crate::name::Name::new_static(def.name),
                exec: ExecToken::Builtin(def.func),
                immediate: def.immediate,
            })?;
        }
        dict.set_fence();

        Ok(Self {
            top: -1,
            ss: Stack::new(params.data_stack_elems),
            rs: Stack::new(params.return_stack_elems),
            pmem,
            dict,
            source: Source::default(),
            output: OutputBuf::new(params.output_bytes),
            mode: Mode::Run,
            state: State::Stop,
            ip: 0,
            deadline: 0,
            slice_ms: params.slice_ms,
            pending_key: false,
            host,
        })
    }

    /// Feeds one line of input, or resumes parked work when the previous
    /// call yielded. On `Err` the stacks are cleared and the rest of the
    /// line is dropped; the VM is immediately usable again.
    pub fn pump(&mut self, line: &str) -> Result<VmSignal, Error> {
        match self.pump_inner(line) {
            Ok(sig) => {
                self.flush_output();
                if sig == VmSignal::Done {
                    self.host.line_done();
                }
                Ok(sig)
            }
            Err(e) => {
                self.ss.clear();
                self.rs.clear();
                self.top = -1;
                self.mode = Mode::Run;
                self.state = State::Stop;
                self.ip = 0;
                self.pending_key = false;
                self.source.drain();
                self.flush_output();
                Err(e)
            }
        }
    }

    /// Delivers the keypress a parked `key` is waiting for. The value
    /// lands on the stack; the next `pump` resumes after the `key`.
    pub fn feed_key(&mut self, key: u8) -> Result<(), Error> {
        if self.state != State::Io || !self.pending_key {
            return Err(Error::KeyNotRequested);
        }
        self.push(key as i32)?;
        self.pending_key = false;
        Ok(())
    }

    fn pump_inner(&mut self, line: &str) -> Result<VmSignal, Error> {
        if self.state == State::Io && self.pending_key {
            // Still waiting on the host; nothing to do.
            return Ok(VmSignal::Yield);
        }
        self.deadline = self.host.now_ms() + self.slice_ms;
        let mut resume = matches!(self.state, State::Hold | State::Io);
        if resume {
            self.ip = self.rs.try_pop()? as u16;
        } else {
            self.source.fill(line);
        }
        loop {
            if resume {
                self.nest()?;
            } else {
                let idiom = match self.next_idiom() {
                    Some(s) => s,
                    None => break,
                };
                if !self.forth_core(&idiom)? {
                    break;
                }
            }
            if self.state == State::Io {
                break;
            }
            resume = self.state == State::Hold;
            if resume && self.host.now_ms() >= self.deadline {
                trace!(ip = self.ip, "slice expired, yielding");
                break;
            }
        }
        if matches!(self.state, State::Hold | State::Io) {
            self.rs.push(self.ip as i32)?;
            Ok(VmSignal::Yield)
        } else {
            self.state = State::Stop;
            if self.mode == Mode::Run {
                self.output.push_str("ok\n")?;
            }
            Ok(VmSignal::Done)
        }
    }

    /// Outer interpreter, one word at a time. Returns `false` when the
    /// rest of the line must be abandoned (unknown word).
    fn forth_core(&mut self, idiom: &str) -> Result<bool, Error> {
        self.state = State::Query;
        if let Some(w) = self.dict.find(&self.pmem, idiom) {
            trace!(word = idiom, idx = w, "found");
            let immediate = match self.dict.get(w as usize) {
                Some(entry) => entry.immediate,
                None => false,
            };
            if self.mode == Mode::Compile && !immediate {
                self.compile_ref(w)?;
            } else {
                self.call(w)?;
            }
            return Ok(true);
        }
        match self.parse_number(idiom) {
            Some(n) => {
                if self.mode == Mode::Compile {
                    self.add_tok(Token::Prim(Prim::Lit))?;
                    self.pmem.push_cell(n)?;
                } else {
                    self.push(n)?;
                }
                Ok(true)
            }
            None => {
                write!(self.output, "{idiom}? \n")?;
                self.mode = Mode::Run;
                self.state = State::Stop;
                Ok(false)
            }
        }
    }

    /// Executes the dictionary entry at `w` to completion (modulo yields).
    pub(crate) fn call(&mut self, w: u16) -> Result<(), Error> {
        let entry = self
            .dict
            .get(w as usize)
            .ok_or(Error::Dict(DictError::IndexOutOfRange))?;
        match entry.exec {
            ExecToken::Builtin(f) => f(self),
            ExecToken::Colon { pfa } => {
                // Zero sentinel: the word's final exit stops the VM.
                self.rs.push(0)?;
                self.ip = pfa;
                self.nest()
            }
        }
    }

    /// Inner interpreter: walks the token stream until the word exits,
    /// the VM parks, or the stream faults.
    fn nest(&mut self) -> Result<(), Error> {
        self.state = State::Nest;
        while self.state == State::Nest && self.ip != 0 {
            let tok = self.pmem.tok_at(self.ip)?;
            self.ip += TOK_BYTES;
            match tok {
                Token::Prim(p) => self.exec_prim(p)?,
                Token::Builtin(idx) => {
                    let entry = self
                        .dict
                        .get(idx as usize)
                        .ok_or(Error::Dict(DictError::IndexOutOfRange))?;
                    match entry.exec {
                        ExecToken::Builtin(f) => f(self)?,
                        ExecToken::Colon { pfa } => {
                            self.rs.push(self.ip as i32)?;
                            self.ip = pfa;
                        }
                    }
                }
                Token::Colon(pfa) => {
                    self.rs.push(self.ip as i32)?;
                    self.ip = pfa;
                }
            }
        }
        Ok(())
    }

    fn exec_prim(&mut self, p: Prim) -> Result<(), Error> {
        match p {
            Prim::Exit => self.unnest()?,
            Prim::Nop => {}
            Prim::Next => {
                let ctr = self.rs.try_peek_back_n_mut(0)?;
                *ctr -= 1;
                if *ctr > -1 {
                    let target = self.pmem.half_at(self.ip)?;
                    self.take_branch(target);
                } else {
                    self.rs.try_pop()?;
                    self.ip += TOK_BYTES;
                }
            }
            Prim::Loop => {
                let limit = self.rs.try_peek_back_n(1)?;
                let idx = self.rs.try_peek_back_n_mut(0)?;
                *idx += 1;
                let again = limit > *idx;
                if again {
                    let target = self.pmem.half_at(self.ip)?;
                    self.take_branch(target);
                } else {
                    self.rs.try_pop()?;
                    self.rs.try_pop()?;
                    self.ip += TOK_BYTES;
                }
            }
            Prim::Lit => {
                let v = self.pmem.cell_at(self.ip)?;
                self.push(v)?;
                self.ip += CELL_BYTES;
            }
            Prim::Var => {
                self.push(self.ip as i32)?;
                self.unnest()?;
            }
            Prim::Str => {
                let (len, skip) = {
                    let s = self.pmem.cstr_at(self.ip)?;
                    (s.len(), Pmem::aligned_strlen(s))
                };
                self.push(self.ip as i32)?;
                self.push(len as i32)?;
                self.ip += skip;
            }
            Prim::DotQ => {
                let (s, skip) = {
                    let s = self.pmem.cstr_at(self.ip)?;
                    (s.to_owned(), Pmem::aligned_strlen(s))
                };
                self.output.push_str(&s)?;
                self.ip += skip;
            }
            Prim::Bran => {
                let target = self.pmem.half_at(self.ip)?;
                self.take_branch(target);
            }
            Prim::ZBran => {
                let target = self.pmem.half_at(self.ip)?;
                if self.pop()? == 0 {
                    self.take_branch(target);
                } else {
                    self.ip += TOK_BYTES;
                }
            }
            Prim::VBran => {
                let data = self.ip + TOK_BYTES;
                self.push(data as i32)?;
                let target = self.pmem.half_at(self.ip)?;
                if target == 0 {
                    self.unnest()?;
                } else {
                    self.ip = target;
                }
            }
            Prim::Does => {
                let pfa = match self.dict.last().exec {
                    ExecToken::Colon { pfa } => pfa,
                    ExecToken::Builtin(_) => return Err(Error::InternalError),
                };
                self.pmem.set_half(pfa + TOK_BYTES, self.ip)?;
                self.unnest()?;
            }
            Prim::For => {
                let n = self.pop()?;
                self.rs.push(n)?;
            }
            Prim::Do => {
                let limit = self.pop_ss()?;
                self.rs.push(limit)?;
                let start = self.pop()?;
                self.rs.push(start)?;
            }
            Prim::Key => {
                self.request_key();
            }
        }
        Ok(())
    }

    /// Pops the return stack into the instruction pointer. A zero saved
    /// IP means the current activation came from the outer interpreter.
    pub(crate) fn unnest(&mut self) -> Result<(), Error> {
        self.ip = self.rs.try_pop()? as u16;
        self.state = if self.ip != 0 { State::Hold } else { State::Stop };
        Ok(())
    }

    /// Jumps to `target`. Backward jumps are the cooperative yield
    /// points: when the slice budget is spent, park instead of looping.
    fn take_branch(&mut self, target: u16) {
        let backward = target <= self.ip;
        self.ip = target;
        if backward && self.host.now_ms() >= self.deadline {
            self.state = State::Hold;
        }
    }

    pub(crate) fn request_key(&mut self) {
        self.host.request_key();
        self.pending_key = true;
        self.state = State::Io;
    }

    /// Runs a named script fetched from the host, then restores the
    /// surrounding execution context. Yields inside the script are driven
    /// internally; the embedder sees one continuous call.
    pub(crate) fn include_source(&mut self, name: &str) -> Result<(), Error> {
        let text = match self.host.fetch_source(name) {
            Some(t) => t,
            None => {
                write!(self.output, "{name} load failed!\n")?;
                return Ok(());
            }
        };
        debug!(name, bytes = text.len(), "including script");
        let saved_ip = self.ip;
        let saved_state = self.state;
        let saved_src = self.source.save();
        self.state = State::Stop;
        let mut failed = None;
        'lines: for line in text.lines() {
            loop {
                match self.pump_inner(line) {
                    Ok(VmSignal::Done) => {
                        self.flush_output();
                        break;
                    }
                    Ok(VmSignal::Yield) => {
                        self.flush_output();
                        if self.state == State::Io {
                            // A key request cannot cross the include
                            // boundary. Cancel it and abandon the rest
                            // of the script.
                            self.rs.try_pop()?;
                            self.pending_key = false;
                            break 'lines;
                        }
                    }
                    Err(e) => {
                        failed = Some(e);
                        break 'lines;
                    }
                }
            }
        }
        self.source.restore(saved_src);
        self.ip = saved_ip;
        self.state = saved_state;
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn push(&mut self, v: i32) -> Result<(), Error> {
        self.ss.push(self.top)?;
        self.top = v;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<i32, Error> {
        let n = self.top;
        self.top = self.ss.try_pop()?;
        Ok(n)
    }

    /// Fails unless at least `n` values are on the stack.
    pub(crate) fn need(&self, n: usize) -> Result<(), Error> {
        if self.ss.depth() < n {
            return Err(Error::Stack(StackError::StackEmpty));
        }
        Ok(())
    }

    /// Pops the value below the cached top. The spill stack's bottom slot
    /// stands in for the cached top and is never data.
    pub(crate) fn pop_ss(&mut self) -> Result<i32, Error> {
        self.need(2)?;
        Ok(self.ss.try_pop()?)
    }

    /// The value `n` below the cached top (0 is the second stack item).
    pub(crate) fn peek_ss(&self, n: usize) -> Result<i32, Error> {
        self.need(n + 2)?;
        Ok(self.ss.try_peek_back_n(n)?)
    }

    pub(crate) fn next_idiom(&mut self) -> Option<String> {
        self.source.next_word().map(str::to_owned)
    }

    fn parse_number(&self, idiom: &str) -> Option<i32> {
        let base = self.pmem.half_at(BASE_ADDR).ok()? as u32;
        let (radix, digits) = match idiom.as_bytes().first()? {
            b'%' => (2, &idiom[1..]),
            b'#' | b'&' => (10, &idiom[1..]),
            b'$' => (16, &idiom[1..]),
            _ => (base, idiom),
        };
        if digits.is_empty() || !(2..=36).contains(&radix) {
            return None;
        }
        i64::from_str_radix(digits, radix).ok().map(|n| n as i32)
    }

    pub(crate) fn radix(&self) -> u32 {
        self.pmem.half_at(BASE_ADDR).map(u32::from).unwrap_or(10)
    }

    fn flush_output(&mut self) {
        let frag = self.output.take();
        if !frag.is_empty() {
            self.host.emit(&frag);
        }
    }

    // Read-only surface for embedders: shells render stack and
    // dictionary views from these without reaching into VM internals.

    pub fn state(&self) -> State {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.ss.depth()
    }

    /// User-visible stack values, bottom to top.
    pub fn stack_values(&self) -> Vec<i32> {
        if self.ss.is_empty() {
            return Vec::new();
        }
        let mut vals: Vec<i32> = self.ss.iter().skip(1).copied().collect();
        vals.push(self.top);
        vals
    }

    pub fn here(&self) -> u16 {
        self.pmem.here()
    }

    pub fn dict_len(&self) -> usize {
        self.dict.len()
    }

    pub fn dict_name(&self, idx: usize) -> Option<&str> {
        self.dict.get(idx).map(|e| e.name.resolve(&self.pmem))
    }

    pub fn mem(&self, at: u16, len: usize) -> Option<&[u8]> {
        self.pmem.bytes_at(at, len).ok()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn release(self) -> H {
        self.host
    }
}
