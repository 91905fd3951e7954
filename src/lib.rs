//! # eforth4
//!
//! A compact token-threaded Forth virtual machine with a cooperative,
//! resumable scheduler, intended for embedding in hosts that must never
//! block (UI threads, single-threaded event loops).
//!
//! Compiled words are streams of 16-bit tokens in a flat parameter arena;
//! a token is a primitive opcode, a builtin-table index, or the arena
//! offset of another colon word's body. The inner interpreter walks these
//! streams with a software instruction pointer and yields control at
//! backward branches when its time slice runs out, so a long-running
//! script never freezes the embedder: [`Forth::pump`] returns
//! [`VmSignal::Yield`] and is simply called again.
//!
//! ```rust
//! use eforth4::{Forth, Host, Params, VmSignal};
//!
//! struct Sink(String);
//! impl Host for Sink {
//!     fn emit(&mut self, frag: &str) { self.0.push_str(frag); }
//!     fn now_ms(&mut self) -> u64 { 0 }
//! }
//!
//! let mut vm = Forth::new(Sink(String::new()), Params::default()).unwrap();
//! let mut sig = vm.pump(": sq dup * ; 7 sq .").unwrap();
//! while sig == VmSignal::Yield {
//!     sig = vm.pump("").unwrap();
//! }
//! assert_eq!(vm.host().0, "49 ok\n");
//! ```

pub mod arena;
pub mod dict;
pub mod host;
pub mod input;
pub mod name;
pub mod output;
pub mod stack;
pub mod testutil;
pub mod token;
pub mod vm;

use arena::ArenaError;
use dict::DictError;
use output::OutputError;
use stack::StackError;

pub use host::{Host, StdHost};
pub use token::{Prim, Token};
pub use vm::{Forth, Params, State, VmSignal};

#[derive(Debug, PartialEq)]
pub enum Error {
    Stack(StackError),
    Arena(ArenaError),
    Dict(DictError),
    Output(OutputError),
    DivideByZero,
    /// `feed_key` without a pending key request.
    KeyNotRequested,
    InternalError,
}

impl From<StackError> for Error {
    fn from(se: StackError) -> Self {
        Error::Stack(se)
    }
}

impl From<ArenaError> for Error {
    fn from(ae: ArenaError) -> Self {
        Error::Arena(ae)
    }
}

impl From<DictError> for Error {
    fn from(de: DictError) -> Self {
        Error::Dict(de)
    }
}

impl From<OutputError> for Error {
    fn from(oe: OutputError) -> Self {
        Error::Output(oe)
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_fe: core::fmt::Error) -> Self {
        Error::Output(OutputError::FormattingErr)
    }
}

/// Interpreting or compiling. Toggled by `:`/`;` and by `[`/`]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Run,
    Compile,
}
