use core::hash::Hasher as _;

use hash32::{FnvHasher, Hasher};

use crate::arena::Pmem;

/// Packed length + 24-bit FNV hash of a word name.
///
/// Dictionary search compares this single `u32` before touching the name
/// bytes, so a miss costs one integer compare. Hashes are always computed
/// over the lowercased bytes, which keeps the prefilter valid whether the
/// dictionary is searched case-sensitively or not.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LenHash {
    // 24..29: 5-bit len (0..31)
    // 00..24: 24-bit FnvHash
    inner: u32,
}

impl LenHash {
    const HASH_MASK: u32 = 0x00FF_FFFF;
    const LEN_MASK: u32 = 0x1F00_0000;

    /// Hashes UP TO 31 ascii characters; longer names hash on their prefix
    /// and are resolved by the byte compare.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let mut hasher = FnvHasher::default();
        let len = s.len().min(31);
        for b in s.as_bytes()[..len].iter() {
            hasher.write(&[b.to_ascii_lowercase()]);
        }
        let hash = hasher.finish32();
        let inner = ((len as u32) << 24) | (hash & Self::HASH_MASK);
        Self { inner }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        ((self.inner & Self::LEN_MASK) >> 24) as usize
    }
}

/// Where a word name lives: builtin names are static, colon-word names are
/// bytes the compiler appended to the parameter arena just ahead of the
/// word's body.
#[derive(Copy, Clone)]
pub enum NameRef {
    Static(&'static str),
    Arena { addr: u16, len: u8 },
}

#[derive(Copy, Clone)]
pub struct Name {
    hash: LenHash,
    repr: NameRef,
}

impl Name {
    pub fn new_static(s: &'static str) -> Self {
        Self {
            hash: LenHash::from_str(s),
            repr: NameRef::Static(s),
        }
    }

    pub fn new_arena(s: &str, addr: u16) -> Self {
        Self {
            hash: LenHash::from_str(s),
            repr: NameRef::Arena {
                addr,
                len: s.len().min(u8::MAX as usize) as u8,
            },
        }
    }

    /// The arena offset of the name bytes, for names the compiler placed
    /// there. `forget` rewinds the arena to this offset.
    pub fn arena_addr(&self) -> Option<u16> {
        match self.repr {
            NameRef::Static(_) => None,
            NameRef::Arena { addr, .. } => Some(addr),
        }
    }

    pub fn resolve<'a>(&'a self, pmem: &'a Pmem) -> &'a str {
        match self.repr {
            NameRef::Static(s) => s,
            NameRef::Arena { addr, len } => pmem.str_at(addr, len as usize).unwrap_or(""),
        }
    }

    /// Hash-then-bytes comparison against a query word. `relaxed` selects
    /// case-insensitive matching (the `case!` word's mode).
    pub fn matches(&self, pmem: &Pmem, word: &str, query_hash: LenHash, relaxed: bool) -> bool {
        if self.hash != query_hash {
            return false;
        }
        let name = self.resolve(pmem);
        if relaxed {
            name.eq_ignore_ascii_case(word)
        } else {
            name == word
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::LenHash;

    #[test]
    fn len_and_case() {
        let a = LenHash::from_str("star");
        let b = LenHash::from_str("STAR");
        let c = LenHash::from_str("star2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 4);
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn long_names_clamp() {
        let long = "a-very-long-word-name-over-thirty-one-chars";
        let h = LenHash::from_str(long);
        assert_eq!(h.len(), 31);
    }
}
