/// Bounded output accumulator. Words write fragments here; the scheduler
/// drains the buffer to the host sink at yield and completion points.
pub struct OutputBuf {
    buf: String,
    cap: usize,
}

#[derive(Debug, PartialEq)]
pub enum OutputError {
    OutputFull,
    FormattingErr,
}

impl OutputBuf {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::with_capacity(cap),
            cap,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn push_str(&mut self, stir: &str) -> Result<(), OutputError> {
        if self.buf.len() + stir.len() > self.cap {
            Err(OutputError::OutputFull)
        } else {
            self.buf.push_str(stir);
            Ok(())
        }
    }

    pub fn push_char(&mut self, c: char) -> Result<(), OutputError> {
        if self.buf.len() + c.len_utf8() > self.cap {
            Err(OutputError::OutputFull)
        } else {
            self.buf.push(c);
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Drains the buffered text for forwarding to the host.
    pub fn take(&mut self) -> String {
        core::mem::take(&mut self.buf)
    }
}

impl core::fmt::Write for OutputBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.push_str(s).map_err(|_| core::fmt::Error)
    }
}

/// Formats `val` in the given radix. Negative values get a leading `-` in
/// decimal and two's-complement digits otherwise, matching C's `%x`.
pub fn fmt_radix(val: i32, radix: u32) -> String {
    if radix == 10 {
        format!("{val}")
    } else {
        fmt_radix_u(val as u32, radix)
    }
}

/// Unsigned variant, for `u.`/`u.r`.
pub fn fmt_radix_u(val: u32, radix: u32) -> String {
    match radix {
        10 => format!("{val}"),
        16 => format!("{val:x}"),
        2 => format!("{val:b}"),
        8 => format!("{val:o}"),
        _ => {
            let mut v = val;
            if v == 0 {
                return "0".into();
            }
            let mut digits = Vec::new();
            while v != 0 {
                let d = v % radix;
                digits.push(core::char::from_digit(d, radix).unwrap_or('?'));
                v /= radix;
            }
            digits.iter().rev().collect()
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::{fmt_radix, OutputBuf, OutputError};

    #[test]
    fn bounded() {
        let mut o = OutputBuf::new(4);
        assert!(o.push_str("abcd").is_ok());
        assert_eq!(o.push_str("e"), Err(OutputError::OutputFull));
        assert_eq!(o.take(), "abcd");
        assert!(o.push_str("e").is_ok());
    }

    #[test]
    fn radix() {
        assert_eq!(fmt_radix(255, 16), "ff");
        assert_eq!(fmt_radix(-1, 10), "-1");
        assert_eq!(fmt_radix(-1, 16), "ffffffff");
        assert_eq!(fmt_radix(5, 2), "101");
        assert_eq!(fmt_radix(35, 36), "z");
    }
}
