/// The current input line and a cursor into it. Words are scanned on
/// demand; parsing words (`(`, `s"`, `."`, `\`) scan to a delimiter
/// instead. The whole cursor state is saved and restored around script
/// inclusion so resumption is transparent.
#[derive(Default)]
pub struct Source {
    buf: String,
    pos: usize,
}

impl Source {
    /// Replaces the line and rewinds the cursor.
    pub fn fill(&mut self, line: &str) {
        self.buf.clear();
        self.buf.push_str(line);
        self.pos = 0;
    }

    /// The next whitespace-delimited word, or `None` at end of line.
    pub fn next_word(&mut self) -> Option<&str> {
        let bytes = self.buf.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos == bytes.len() {
            return None;
        }
        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Some(&self.buf[start..self.pos])
    }

    /// Everything up to (not including) the next `delim`, consuming the
    /// delimiter. At end of line the remainder is returned. A single
    /// leading space separating the word from its argument is skipped.
    pub fn scan(&mut self, delim: u8) -> &str {
        let bytes = self.buf.as_bytes();
        if self.pos < bytes.len() && bytes[self.pos] == b' ' {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != delim {
            self.pos += 1;
        }
        let end = self.pos;
        if self.pos < bytes.len() {
            self.pos += 1;
        }
        &self.buf[start..end]
    }

    /// Discards the rest of the line (`\` comment, abort).
    pub fn drain(&mut self) {
        self.pos = self.buf.len();
    }

    pub fn is_done(&self) -> bool {
        let bytes = self.buf.as_bytes();
        bytes[self.pos..].iter().all(|b| b.is_ascii_whitespace())
    }

    /// Detaches the cursor state, leaving an empty source behind. Used by
    /// `included` to nest a script inside the current line.
    pub fn save(&mut self) -> Source {
        core::mem::take(self)
    }

    pub fn restore(&mut self, saved: Source) {
        *self = saved;
    }
}

#[cfg(test)]
pub mod test {
    use super::Source;

    #[test]
    fn word_scan() {
        let mut src = Source::default();
        src.fill("  1 2  dup\t+ ");
        assert_eq!(src.next_word(), Some("1"));
        assert_eq!(src.next_word(), Some("2"));
        assert_eq!(src.next_word(), Some("dup"));
        assert_eq!(src.next_word(), Some("+"));
        assert_eq!(src.next_word(), None);
        assert!(src.is_done());
    }

    #[test]
    fn delimiter_scan() {
        let mut src = Source::default();
        src.fill(r#"s" hello world" drop"#);
        assert_eq!(src.next_word(), Some(r#"s""#));
        assert_eq!(src.scan(b'"'), "hello world");
        assert_eq!(src.next_word(), Some("drop"));
    }

    #[test]
    fn unterminated_scan_takes_rest() {
        let mut src = Source::default();
        src.fill("( never closed");
        assert_eq!(src.next_word(), Some("("));
        assert_eq!(src.scan(b')'), "never closed");
        assert!(src.is_done());
    }
}
