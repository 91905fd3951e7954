use std::io::Write as _;
use std::time::Instant;

/// Everything the VM needs from its embedder, folded into one seam so a
/// single context object can back a REPL, a UI shell, or a test harness.
///
/// Only `emit` and `now_ms` are load-bearing; the rest default to no-ops
/// so minimal hosts stay minimal.
pub trait Host {
    /// Receives an output fragment. Fragments are flushed whenever the VM
    /// returns control, so a fragment is not necessarily a full line.
    fn emit(&mut self, frag: &str);

    /// Called once per completed (non-yielding) pump. Hosts that batch
    /// rendering redraw here.
    fn line_done(&mut self) {}

    /// The VM has parked waiting for a keypress; deliver one later via
    /// `Forth::feed_key`.
    fn request_key(&mut self) {}

    /// Resolves a script name for `included`. `None` means not found.
    fn fetch_source(&mut self, name: &str) -> Option<String> {
        let _ = name;
        None
    }

    /// Receives a rendered native-call message from the `js` bridge.
    fn dispatch(&mut self, msg: &str) {
        let _ = msg;
    }

    /// Monotonic milliseconds, the time base for the cooperative slice
    /// and for `ms`. Tests substitute a hand-cranked clock here.
    fn now_ms(&mut self) -> u64;
}

/// Stdout-backed host for quick interactive use.
pub struct StdHost {
    epoch: Instant,
}

impl StdHost {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for StdHost {
    fn emit(&mut self, frag: &str) {
        print!("{frag}");
        let _ = std::io::stdout().flush();
    }

    fn now_ms(&mut self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
