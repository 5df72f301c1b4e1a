//! Hash-based exact-match engine.
//!
//! An exact-match way hashes the input bus with its hash group, uses hash
//! bits to pick a RAM unit and entry, and compares the entry's stored bytes
//! against one 16-byte match group after the row's byte swizzle:
//!
//! ```text
//! hash ──▶ select = hash[select_shift +: select_bits] ──▶ unit (row, col + select)
//!      └─▶ index  = hash[index_shift +: 10]           ──▶ entry
//!
//! match group ──▶ swizzle[row][bus] ──▶ compare (bytemask) ◀── entry bytes
//! ```

use std::collections::BTreeMap;

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, EXACT_GROUP_BYTES, EXACT_WAYS, SRAM_COLS, SRAM_ROWS, SWIZZLE_BUSES};
use crate::error::ConfigError;
use crate::mau::hash::{HashConfig, HashValue};
use crate::mau::input_xbar::MatchInput;
use crate::mau::sram::{ExactEntry, SramArray};

/// Byte permutation applied to a match group before compare.
///
/// Output byte `i` takes input byte `ctl[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swizzle([u8; EXACT_GROUP_BYTES]);

impl Default for Swizzle {
    fn default() -> Self {
        Self::identity()
    }
}

impl Swizzle {
    pub fn new(ctl: [u8; EXACT_GROUP_BYTES]) -> Self {
        Self(ctl)
    }

    pub fn identity() -> Self {
        let mut ctl = [0u8; EXACT_GROUP_BYTES];
        for (i, c) in ctl.iter_mut().enumerate() {
            *c = i as u8;
        }
        Self(ctl)
    }

    pub fn ctl(&self) -> &[u8; EXACT_GROUP_BYTES] {
        &self.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Every input byte used exactly once.
    pub fn is_permutation(&self) -> bool {
        let mut seen = 0u32;
        for &c in &self.0 {
            if c as usize >= EXACT_GROUP_BYTES {
                return false;
            }
            seen |= 1 << c;
        }
        seen == (1 << EXACT_GROUP_BYTES) - 1
    }

    pub fn apply(&self, bytes: &[u8; EXACT_GROUP_BYTES]) -> [u8; EXACT_GROUP_BYTES] {
        let mut out = [0u8; EXACT_GROUP_BYTES];
        for (o, &c) in out.iter_mut().zip(&self.0) {
            *o = bytes[c as usize % EXACT_GROUP_BYTES];
        }
        out
    }

    /// Inverse permutation. Only meaningful when `is_permutation()`.
    pub fn invert(&self) -> Self {
        let mut inv = [0u8; EXACT_GROUP_BYTES];
        for (i, &c) in self.0.iter().enumerate() {
            inv[c as usize % EXACT_GROUP_BYTES] = i as u8;
        }
        Self(inv)
    }
}

/// Decoded `exact_way_ctl` for one enabled way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WayConfig {
    pub way: u8,
    pub logical_table: u8,
    pub hash_group: u8,
    pub match_group: u8,
    pub ram_row: u8,
    pub ram_col: u8,
    pub select_bits: u8,
    pub index_shift: u8,
    pub select_shift: u8,
    pub bus: u8,
    pub priority: u8,
    pub bytemask: u16,
}

impl WayConfig {
    /// Decode a way control word, `None` when disabled.
    pub fn decode(way: u8, ctl: u64, bytemask: u16) -> Option<Self> {
        if ctl & 1 == 0 {
            return None;
        }
        Some(Self {
            way,
            logical_table: ((ctl >> 1) & 0xF) as u8,
            hash_group: ((ctl >> 5) & 0x7) as u8,
            match_group: ((ctl >> 8) & 0x7) as u8,
            ram_row: ((ctl >> 11) & 0x7) as u8,
            ram_col: ((ctl >> 14) & 0xF) as u8,
            select_bits: ((ctl >> 18) & 0x3) as u8,
            index_shift: ((ctl >> 20) & 0x3F) as u8,
            select_shift: ((ctl >> 26) & 0x3F) as u8,
            bus: ((ctl >> 32) & 0x1) as u8,
            priority: ((ctl >> 33) & 0xF) as u8,
            bytemask,
        })
    }

    pub fn encode(&self) -> u64 {
        1 | ((self.logical_table as u64 & 0xF) << 1)
            | ((self.hash_group as u64 & 0x7) << 5)
            | ((self.match_group as u64 & 0x7) << 8)
            | ((self.ram_row as u64 & 0x7) << 11)
            | ((self.ram_col as u64 & 0xF) << 14)
            | ((self.select_bits as u64 & 0x3) << 18)
            | ((self.index_shift as u64 & 0x3F) << 20)
            | ((self.select_shift as u64 & 0x3F) << 26)
            | ((self.bus as u64 & 0x1) << 32)
            | ((self.priority as u64 & 0xF) << 33)
    }

    /// RAM unit and entry index selected by a hash value.
    pub fn locate(&self, hash: HashValue) -> (u8, u8, u16) {
        let select = hash.field(self.select_shift, self.select_bits) as u8;
        let index = hash.field(self.index_shift, 10) as u16;
        (self.ram_row, self.ram_col + select, index)
    }

    /// Highest column the way can reach.
    fn last_col(&self) -> u8 {
        self.ram_col + ((1u8 << self.select_bits) - 1)
    }
}

/// An exact-match hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactHit {
    pub way: u8,
    pub row: u8,
    pub col: u8,
    pub index: u16,
    pub hash: HashValue,
    /// `row << 14 | col << 10 | index`
    pub match_adr: u32,
    pub entry: ExactEntry,
}

/// Swizzle control of one (row, bus), with whether software programmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwizzleCtl {
    pub swizzle: Swizzle,
    pub programmed: bool,
}

/// Decoded exact-match configuration.
#[derive(Debug, Clone, Default)]
pub struct ExactConfig {
    ways: Vec<WayConfig>,
    swizzles: Vec<[SwizzleCtl; SWIZZLE_BUSES]>,
}

impl ExactConfig {
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let mut config = Self { ways: Vec::new(), swizzles: vec![[SwizzleCtl::default(); SWIZZLE_BUSES]; SRAM_ROWS] };

        if let (Some(ctl), Some(mask)) = (field_by_block(block::EXACT_WAY_CTL), field_by_block(block::EXACT_MATCH_BYTEMASK)) {
            for way in 0..EXACT_WAYS {
                let bytemask = regs.get(mask, way, 0, 0) as u16;
                if let Some(w) = WayConfig::decode(way as u8, regs.get_u64(ctl, way, 0, 0), bytemask) {
                    config.ways.push(w);
                }
            }
        }

        if let Some(spec) = field_by_block(block::EXACTMATCH_BYTESWIZZLE_CTL) {
            for (row, buses) in config.swizzles.iter_mut().enumerate() {
                for (bus, slot) in buses.iter_mut().enumerate() {
                    let programmed = (0..EXACT_GROUP_BYTES).any(|i| regs.was_written(spec, row, bus, i));
                    if !programmed {
                        continue;
                    }
                    let mut ctl = [0u8; EXACT_GROUP_BYTES];
                    for (i, c) in ctl.iter_mut().enumerate() {
                        *c = regs.get(spec, row, bus, i) as u8;
                    }
                    *slot = SwizzleCtl { swizzle: Swizzle::new(ctl), programmed };
                }
            }
        }
        Ok(config)
    }

    pub fn ways(&self) -> &[WayConfig] {
        &self.ways
    }

    /// Whether any way serves a logical table.
    pub fn serves(&self, logical_table: u8) -> bool {
        self.ways.iter().any(|w| w.logical_table == logical_table)
    }

    pub fn swizzle(&self, row: usize, bus: usize) -> &Swizzle {
        &self.swizzles[row][bus].swizzle
    }

    /// Overwrite a swizzle control.
    pub fn set_swizzle(&mut self, row: usize, bus: usize, ctl: SwizzleCtl) {
        self.swizzles[row][bus] = ctl;
    }

    /// (row, bus) pairs used by at least one way.
    pub fn swizzles_in_use(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ways.iter().map(|w| (w.ram_row as usize, w.bus as usize))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (row, buses) in self.swizzles.iter().enumerate() {
            for (bus, ctl) in buses.iter().enumerate() {
                if ctl.programmed && !ctl.swizzle.is_permutation() {
                    return Err(ConfigError::SwizzleNotPermutation { row: row as u8, bus: bus as u8 });
                }
            }
        }

        let mut seen: BTreeMap<(u8, u8), u8> = BTreeMap::new();
        for w in &self.ways {
            if w.last_col() as usize >= SRAM_COLS {
                return Err(ConfigError::RamUnitOutOfRange { way: w.way, row: w.ram_row, col: w.last_col() });
            }
            if let Some(&first) = seen.get(&(w.logical_table, w.priority)) {
                return Err(ConfigError::AmbiguousWayPriority {
                    logical_table: w.logical_table,
                    priority: w.priority,
                    first,
                    second: w.way,
                });
            }
            seen.insert((w.logical_table, w.priority), w.way);
        }
        Ok(())
    }

    /// Look up one way.
    pub fn lookup_way(&self, way: &WayConfig, input: &MatchInput, hash: &HashConfig, sram: &SramArray) -> Option<ExactHit> {
        let h = hash.compute(way.hash_group as usize, input);
        let (row, col, index) = way.locate(h);
        let entry = sram.exact_entry(row, col, index);
        if !entry.valid {
            return None;
        }

        let key = self.swizzles[row as usize][way.bus as usize]
            .swizzle
            .apply(&input.exact_group(way.match_group as usize));
        let matched = (0..EXACT_GROUP_BYTES)
            .filter(|i| way.bytemask & (1 << i) != 0)
            .all(|i| key[i] == entry.match_bytes[i]);
        if !matched {
            return None;
        }

        log::trace!("way {} hit unit ({},{}) index {} hash {}", way.way, row, col, index, h);
        Some(ExactHit {
            way: way.way,
            row,
            col,
            index,
            hash: h,
            match_adr: ((row as u32) << 14) | ((col as u32) << 10) | index as u32,
            entry,
        })
    }

    /// Highest-priority hit among a logical table's ways.
    pub fn lookup(&self, logical_table: u8, input: &MatchInput, hash: &HashConfig, sram: &SramArray) -> Option<(ExactHit, u8)> {
        self.ways
            .iter()
            .filter(|w| w.logical_table == logical_table)
            .filter_map(|w| self.lookup_way(w, input, hash, sram).map(|hit| (hit, w.priority)))
            .min_by_key(|(_, priority)| *priority)
    }
}
