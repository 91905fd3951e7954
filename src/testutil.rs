//! Test harness: a scripted [`Host`] that records everything the VM does,
//! plus a tiny "ui test" runner for integration tests.
//!
//! Ui tests are plain text. Lines starting with `>` are fed to the VM and
//! must succeed; consecutive lines starting with `<` are the exact output
//! expected since the previous input; lines starting with `x` must make
//! the VM return an error. Blank lines and `#` comments are ignored.

use std::collections::BTreeMap;

use crate::{Error, Forth, Host, Params, State, VmSignal};

/// Deterministic host double. The clock is hand-cranked: `now` is the
/// current time and `tick` is added on every read, so a nonzero tick
/// forces the slice budget to expire at the first backward branch.
#[derive(Default)]
pub struct TestHost {
    pub out: String,
    pub lines_done: usize,
    pub keys_requested: usize,
    pub dispatched: Vec<String>,
    pub sources: BTreeMap<String, String>,
    pub now: u64,
    pub tick: u64,
}

impl Host for TestHost {
    fn emit(&mut self, frag: &str) {
        self.out.push_str(frag);
    }

    fn line_done(&mut self) {
        self.lines_done += 1;
    }

    fn request_key(&mut self) {
        self.keys_requested += 1;
    }

    fn fetch_source(&mut self, name: &str) -> Option<String> {
        self.sources.get(name).cloned()
    }

    fn dispatch(&mut self, msg: &str) {
        self.dispatched.push(msg.to_owned());
    }

    fn now_ms(&mut self) -> u64 {
        self.now += self.tick;
        self.now
    }
}

pub fn test_vm() -> Forth<TestHost> {
    match Forth::new(TestHost::default(), Params::default()) {
        Ok(vm) => vm,
        Err(e) => panic!("vm construction failed: {e:?}"),
    }
}

/// Feeds one line and drives any yields to completion. Stops early if the
/// VM parks waiting for a key (the test must `feed_key` and call again).
pub fn drive(vm: &mut Forth<TestHost>, line: &str) -> Result<VmSignal, Error> {
    let mut sig = vm.pump(line)?;
    while sig == VmSignal::Yield && vm.state() != State::Io {
        sig = vm.pump("")?;
    }
    Ok(sig)
}

/// Runs a ui-test script against a fresh VM and returns the VM for
/// further poking.
pub fn run_test(text: &str) -> Forth<TestHost> {
    let mut vm = test_vm();
    run_test_with(&mut vm, text);
    vm
}

pub fn run_test_with(vm: &mut Forth<TestHost>, text: &str) {
    let mut lines = text.lines().peekable();
    while let Some(raw) = lines.next() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (tag, rest) = line.split_at(1);
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match tag {
            ">" => {
                // Expectations cover one input line at a time.
                vm.host_mut().out.clear();
                match drive(vm, rest) {
                    Ok(_) => {}
                    Err(e) => panic!("line {rest:?} failed: {e:?}"),
                }
            }
            "<" => {
                let mut expected = String::from(rest);
                while let Some(next) = lines.peek() {
                    let next = next.trim();
                    match next.strip_prefix('<') {
                        Some(more) => {
                            expected.push('\n');
                            expected.push_str(more.strip_prefix(' ').unwrap_or(more));
                            lines.next();
                        }
                        None => break,
                    }
                }
                let got = core::mem::take(&mut vm.host_mut().out);
                assert_eq!(
                    normalize(&got),
                    normalize(&expected),
                    "unexpected output (got left, wanted right)"
                );
            }
            "x" => {
                vm.host_mut().out.clear();
                match drive(vm, rest) {
                    Ok(sig) => panic!("line {rest:?} succeeded with {sig:?}, expected error"),
                    Err(_) => {}
                }
            }
            other => panic!("bad test line tag {other:?} in {raw:?}"),
        }
    }
}

fn normalize(s: &str) -> String {
    s.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_owned()
}

#[cfg(test)]
pub mod test {
    use super::{run_test, TestHost};
    use crate::Host;

    #[test]
    fn runner_smoke() {
        run_test(
            r#"
            # arithmetic and the ok prompt
            > 1 2 + .
            < 3 ok
            x drop drop
            "#,
        );
    }

    #[test]
    fn clock_is_deterministic() {
        let mut host = TestHost {
            tick: 3,
            ..Default::default()
        };
        assert_eq!(host.now_ms(), 3);
        assert_eq!(host.now_ms(), 6);
    }
}
