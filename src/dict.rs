use crate::{
    arena::Pmem,
    name::{LenHash, Name},
    Error, Forth,
};

/// A builtin word body. Builtins take the whole VM context so they can
/// reach the stacks, the arena, the input cursor, and the host.
pub type WordFunc<H> = fn(&mut Forth<H>) -> Result<(), Error>;

/// One row of the static builtin table.
pub struct BuiltinEntry<H: 'static> {
    pub name: &'static str,
    pub func: WordFunc<H>,
    pub immediate: bool,
}

/// How a dictionary entry executes: native function, or a token stream in
/// the arena starting at `pfa`.
pub enum ExecToken<H: 'static> {
    Builtin(WordFunc<H>),
    Colon { pfa: u16 },
}

impl<H> Clone for ExecToken<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for ExecToken<H> {}

pub struct Entry<H: 'static> {
    pub name: Name,
    pub exec: ExecToken<H>,
    pub immediate: bool,
}

#[derive(Debug, PartialEq)]
pub enum DictError {
    DictionaryFull,
    IndexOutOfRange,
}

/// Append-only word list with a fixed capacity. Index 0 is a sentinel
/// that search skips, so "not found" never aliases a real word and index
/// arithmetic in the disassembler stays simple.
pub struct Dict<H: 'static> {
    entries: Vec<Entry<H>>,
    cap: usize,
    /// Index one past the last builtin; `forget` will not cross it.
    fence: usize,
    /// When set, search ignores ASCII case (`0 case!`).
    pub relaxed: bool,
}

impl<H> Dict<H> {
    pub fn new(cap: usize) -> Self {
        let mut entries = Vec::with_capacity(cap);
        entries.push(Entry {
            name: Name::new_static("nul"),
            exec: ExecToken::Builtin(|_| Ok(())),
            immediate: false,
        });
        Self {
            entries,
            cap,
            fence: 1,
            relaxed: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn fence(&self) -> usize {
        self.fence
    }

    /// Marks the current length as the protected baseline. Called once
    /// after the builtin table is installed.
    pub fn set_fence(&mut self) {
        self.fence = self.entries.len();
    }

    pub fn get(&self, idx: usize) -> Option<&Entry<H>> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Entry<H>> {
        self.entries.get_mut(idx)
    }

    pub fn last(&self) -> &Entry<H> {
        // Slot 0 always exists.
        &self.entries[self.entries.len() - 1]
    }

    pub fn last_mut(&mut self) -> &mut Entry<H> {
        let idx = self.entries.len() - 1;
        &mut self.entries[idx]
    }

    pub fn push(&mut self, entry: Entry<H>) -> Result<u16, DictError> {
        if self.entries.len() == self.cap {
            return Err(DictError::DictionaryFull);
        }
        let idx = self.entries.len() as u16;
        self.entries.push(entry);
        Ok(idx)
    }

    pub fn pop(&mut self) -> Option<Entry<H>> {
        if self.entries.len() <= self.fence {
            return None;
        }
        self.entries.pop()
    }

    /// Newest-first lookup, skipping the sentinel. Returns the index so
    /// callers can compile a builtin reference directly.
    pub fn find(&self, pmem: &Pmem, word: &str) -> Option<u16> {
        let hash = LenHash::from_str(word);
        for idx in (1..self.entries.len()).rev() {
            let entry = &self.entries[idx];
            if entry.name.matches(pmem, word, hash, self.relaxed) {
                return Some(idx as u16);
            }
        }
        None
    }

    /// Rewinds past every entry at or above `idx`, returning the lowest
    /// arena offset released (the earliest name), if any entry carried one.
    pub fn truncate(&mut self, idx: usize) -> Option<u16> {
        let idx = idx.max(self.fence);
        let mut low = None;
        while self.entries.len() > idx {
            if let Some(entry) = self.entries.pop() {
                if let Some(addr) = entry.name.arena_addr() {
                    low = Some(addr);
                }
            }
        }
        low
    }
}

#[cfg(test)]
pub mod test {
    use super::{Dict, Entry, ExecToken};
    use crate::{arena::Pmem, name::Name, host::StdHost};

    fn colon_entry(pmem: &mut Pmem, name: &str, pfa: u16) -> Entry<StdHost> {
        let addr = pmem.push_str(name).unwrap();
        Entry {
            name: Name::new_arena(name, addr),
            exec: ExecToken::Colon { pfa },
            immediate: false,
        }
    }

    #[test]
    fn newest_wins() {
        let mut pmem = Pmem::new(256);
        let mut dict = Dict::<StdHost>::new(16);
        dict.push(colon_entry(&mut pmem, "star", 0x20)).unwrap();
        dict.push(colon_entry(&mut pmem, "star", 0x40)).unwrap();
        let idx = dict.find(&pmem, "star").unwrap();
        match dict.get(idx as usize).unwrap().exec {
            ExecToken::Colon { pfa } => assert_eq!(pfa, 0x40),
            ExecToken::Builtin(_) => panic!("expected colon word"),
        }
    }

    #[test]
    fn sentinel_is_invisible() {
        let pmem = Pmem::new(64);
        let dict = Dict::<StdHost>::new(16);
        assert_eq!(dict.find(&pmem, "nul"), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn case_modes() {
        let mut pmem = Pmem::new(256);
        let mut dict = Dict::<StdHost>::new(16);
        dict.push(colon_entry(&mut pmem, "Star", 0x20)).unwrap();
        assert!(dict.find(&pmem, "STAR").is_none());
        assert!(dict.find(&pmem, "Star").is_some());
        dict.relaxed = true;
        assert!(dict.find(&pmem, "STAR").is_some());
    }
}
