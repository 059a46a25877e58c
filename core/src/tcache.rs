//! Direct-mapped caches on the fetch path.

use crate::config::*;
use crate::insn::Decoded;

/// Virtual page to physical page, for instruction fetch.
///
/// Not coherent with the TLB: whoever rewrites a live mapping must flush.
#[derive(Debug, Clone)]
pub struct TranslationCache {
    /// (virtual page, physical page)
    buckets: Vec<Option<(u64, u64)>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self {
            buckets: vec![None; TC_NUM],
        }
    }

    fn index(va: u64) -> usize {
        ((va >> PAGE_BITS) as usize) & (TC_NUM - 1)
    }

    /// Returns the physical address for `va` if its page is cached.
    pub fn lookup(&self, va: u64) -> Option<u64> {
        match self.buckets[Self::index(va)] {
            Some((vpage, ppage)) if vpage == va & PAGE_MASK => Some(ppage | (va & !PAGE_MASK)),
            _ => None,
        }
    }

    /// Caches the page of `va`, evicting whatever shared its bucket.
    pub fn insert(&mut self, va: u64, pa: u64) {
        self.buckets[Self::index(va)] = Some((va & PAGE_MASK, pa & PAGE_MASK));
    }

    pub fn flush(&mut self) {
        self.buckets.fill(None);
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded instructions indexed by pc; a hit requires the same raw word.
#[derive(Debug)]
pub struct DecodeCache {
    buckets: Vec<Option<(u32, Decoded)>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self {
            buckets: vec![None; IC_NUM],
        }
    }

    fn index(pc: u64) -> usize {
        ((pc >> 2) as usize) & (IC_NUM - 1)
    }

    pub fn lookup(&self, pc: u64, raw: u32) -> Option<&Decoded> {
        match &self.buckets[Self::index(pc)] {
            Some((word, decoded)) if *word == raw => Some(decoded),
            _ => None,
        }
    }

    pub fn insert(&mut self, pc: u64, raw: u32, decoded: Decoded) {
        self.buckets[Self::index(pc)] = Some((raw, decoded));
    }
}

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{Decoder, La64Decoder};

    #[test]
    fn test_translation_hit_and_miss() {
        let mut tc = TranslationCache::new();
        assert_eq!(tc.lookup(0x1c00_0000), None);

        tc.insert(0x9000_0000_1c00_0004, 0x1c00_0000);
        assert_eq!(tc.lookup(0x9000_0000_1c00_0ffc), Some(0x1c00_0ffc));
        // Same bucket, different page.
        assert_eq!(tc.lookup(0x9000_0000_1c10_0000), None);

        tc.insert(0x9000_0000_1c10_0000, 0x20_0000);
        assert_eq!(tc.lookup(0x9000_0000_1c00_0000), None);
        assert_eq!(tc.lookup(0x9000_0000_1c10_0008), Some(0x20_0008));

        tc.flush();
        assert_eq!(tc.lookup(0x9000_0000_1c10_0008), None);
    }

    #[test]
    fn test_empty_bucket_never_matches_page_zero() {
        let tc = TranslationCache::new();
        assert_eq!(tc.lookup(0), None);
    }

    #[test]
    fn test_decode_cache_checks_word() {
        let mut ic = DecodeCache::new();
        let addi = 0x02c0_0484;
        let decoded = La64Decoder.decode(addi).unwrap();
        ic.insert(0x1c00_0000, addi, decoded);

        assert!(ic.lookup(0x1c00_0000, addi).is_some());
        assert!(ic.lookup(0x1c00_0000, 0x0015_0004).is_none());
        // An aliasing pc with the same word decodes identically.
        assert!(ic.lookup(0x1c01_0000, addi).is_some());
    }
}
