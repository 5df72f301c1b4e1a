//! SRAM array view.
//!
//! Match entries and ternary-indirection words live in the 8 x 12 grid of
//! 1024-entry, 128-bit RAM units. Each entry is a pair of words.
//!
//! ```text
//! exact entry:  word0 = match bytes 15..0 (byte 0 lowest)
//!               word1 = overhead[66:3] | version[2:1] | valid[0]
//! tind word:    word0 = overhead(odd)[127:64] | overhead(even)[63:0]
//! ```

use std::collections::BTreeMap;

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::block;
use crate::mau::address_dist::Overhead;

/// A decoded exact-match RAM entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactEntry {
    pub match_bytes: [u8; 16],
    pub valid: bool,
    pub version: u8,
    pub overhead: Overhead,
}

impl ExactEntry {
    pub fn decode(word0: u128, word1: u128) -> Self {
        Self {
            match_bytes: word0.to_le_bytes(),
            valid: word1 & 1 != 0,
            version: ((word1 >> 1) & 0x3) as u8,
            overhead: Overhead::new((word1 >> 3) as u64),
        }
    }

    pub fn encode(&self) -> (u128, u128) {
        let word0 = u128::from_le_bytes(self.match_bytes);
        let word1 = (self.valid as u128) | (((self.version & 0x3) as u128) << 1) | ((self.overhead.raw() as u128) << 3);
        (word0, word1)
    }
}

/// Sparse copy of the SRAM contents.
#[derive(Debug, Clone, Default)]
pub struct SramArray {
    words: BTreeMap<(u8, u8, u16), (u128, u128)>,
}

impl SramArray {
    pub fn decode(regs: &RegisterFile) -> Self {
        let words = regs
            .memory_words(block::SRAM)
            .map(|(addr, w)| ((addr.i0 as u8, addr.i1 as u8, addr.i2), w))
            .collect();
        Self { words }
    }

    /// Word pair at a unit entry, zero if never written.
    pub fn word(&self, row: u8, col: u8, index: u16) -> (u128, u128) {
        self.words.get(&(row, col, index)).copied().unwrap_or((0, 0))
    }

    pub fn exact_entry(&self, row: u8, col: u8, index: u16) -> ExactEntry {
        let (w0, w1) = self.word(row, col, index);
        ExactEntry::decode(w0, w1)
    }

    /// Overhead selected by a TCAM match address from a tind unit.
    pub fn tind_overhead(&self, row: u8, col: u8, match_adr: u32) -> Overhead {
        let index = ((match_adr >> 1) & 0x3FF) as u16;
        let (w0, _) = self.word(row, col, index);
        let half = if match_adr & 1 == 0 { w0 as u64 } else { (w0 >> 64) as u64 };
        Overhead::new(half)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
