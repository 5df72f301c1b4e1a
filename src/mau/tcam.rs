//! TCAM match engine.
//!
//! # Word Layout
//!
//! ```text
//!  46   45 44      41 40                      1   0
//! +--------+----------+-------------------------+---+
//! |version |  nibble  |   key bytes 4..0        |pay|
//! +--------+----------+-------------------------+---+
//! ```
//!
//! Each entry is a pair of words. Per bit, word0 means "matches a 0" and
//! word1 means "matches a 1": both set is don't-care, both clear never
//! matches. Version bits are not compared; they are reported on a hit.
//!
//! # Chaining
//!
//! A TCAM with the chain bit set feeds its per-entry match vector into the
//! TCAM one row up in the same column, so a wide key spans several rows.
//! Only the top of a chain (the head) reports hits.

use std::collections::BTreeMap;

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, TCAM_COLS, TCAM_GROUPS, TCAM_HALFBYTES, TCAM_ROWS};
use crate::error::ConfigError;
use crate::mau::input_xbar::MatchInput;

/// Compared bits: payload, key bytes and nibble.
pub const TCAM_KEY_MASK: u64 = (1 << 45) - 1;

/// Version field shift.
pub const TCAM_VERSION_SHIFT: u32 = 45;

/// One ternary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcamEntry {
    pub word0: u64,
    pub word1: u64,
}

impl TcamEntry {
    pub fn new(word0: u64, word1: u64) -> Self {
        Self { word0, word1 }
    }

    /// Build an entry matching `key` on the bits set in `mask`.
    pub fn from_value_mask(key: u64, mask: u64, version: u8) -> Self {
        let key = key & TCAM_KEY_MASK;
        let mask = mask & TCAM_KEY_MASK;
        let ver = ((version as u64) & 0x3) << TCAM_VERSION_SHIFT;
        Self {
            word0: ((!key | !mask) & TCAM_KEY_MASK) | ver,
            word1: ((key | !mask) & TCAM_KEY_MASK) | ver,
        }
    }

    /// Bits that take part in the compare.
    #[inline]
    pub fn mask(&self) -> u64 {
        (self.word0 ^ self.word1) & TCAM_KEY_MASK
    }

    /// Value compared on the cared-for bits.
    #[inline]
    pub fn value(&self) -> u64 {
        self.word1 & self.mask()
    }

    #[inline]
    pub fn version(&self) -> u8 {
        ((self.word1 >> TCAM_VERSION_SHIFT) & 0x3) as u8
    }

    /// Ternary compare against a search key.
    #[inline]
    pub fn matches(&self, key: u64) -> bool {
        let hit = (key & self.word1) | (!key & self.word0);
        hit & TCAM_KEY_MASK == TCAM_KEY_MASK
    }
}

/// Build a search key from its parts.
pub fn search_key(bytes: [u8; 5], nibble: u8, payload: bool) -> u64 {
    let mut key = payload as u64;
    for (i, b) in bytes.iter().enumerate() {
        key |= (*b as u64) << (1 + 8 * i);
    }
    key | (((nibble & 0xF) as u64) << 41)
}

/// `tcam_row_input_ctl`: which crossbar group and nibble feed a TCAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcamRowInput {
    pub group: u8,
    pub halfbyte: Option<u8>,
}

impl TcamRowInput {
    pub fn decode(value: u16) -> (u8, u8, bool) {
        ((value & 0xF) as u8, ((value >> 4) & 0xF) as u8, value & 0x100 != 0)
    }

    pub fn encode(&self) -> u16 {
        match self.halfbyte {
            Some(h) => (self.group as u16) | ((h as u16) << 4) | 0x100,
            None => self.group as u16,
        }
    }
}

/// `tcam_table_prop`: ownership and priority of a TCAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcamTableProp {
    pub enabled: bool,
    pub logical_table: u8,
    pub priority: u8,
    pub chain: bool,
}

impl TcamTableProp {
    pub fn decode(value: u16) -> Self {
        Self {
            enabled: value & 1 != 0,
            logical_table: ((value >> 1) & 0xF) as u8,
            priority: ((value >> 5) & 0xF) as u8,
            chain: value & 0x200 != 0,
        }
    }

    pub fn encode(&self) -> u16 {
        (self.enabled as u16)
            | ((self.logical_table as u16 & 0xF) << 1)
            | ((self.priority as u16 & 0xF) << 5)
            | ((self.chain as u16) << 9)
    }
}

/// One physical TCAM and its entries.
#[derive(Debug, Clone)]
pub struct TcamUnit {
    pub row: u8,
    pub col: u8,
    pub input: TcamRowInput,
    pub prop: TcamTableProp,
    entries: BTreeMap<u16, TcamEntry>,
}

impl TcamUnit {
    /// Programmed entries in index order.
    pub fn entries(&self) -> impl Iterator<Item = (u16, &TcamEntry)> {
        self.entries.iter().map(|(i, e)| (*i, e))
    }

    pub fn entry(&self, index: u16) -> Option<&TcamEntry> {
        self.entries.get(&index)
    }

    fn key(&self, input: &MatchInput, payload: bool) -> u64 {
        let nibble = self.input.halfbyte.map(|h| input.tcam_nibble(h as usize)).unwrap_or(0);
        search_key(input.tcam_group(self.input.group as usize), nibble, payload)
    }
}

/// A TCAM hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcamHit {
    pub row: u8,
    pub col: u8,
    pub index: u16,
    /// `tcam priority << 9 | index`, lower wins
    pub priority: u16,
    pub version: u8,
    /// `col << 13 | row << 9 | index`
    pub match_adr: u32,
}

/// All TCAMs of the stage.
#[derive(Debug, Clone)]
pub struct TcamArray {
    units: Vec<TcamUnit>,
    /// Value driven on payload bit 0 of every search key
    pub payload_bit: bool,
}

impl TcamArray {
    /// Decode row inputs, table properties and entries.
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let (Some(input_spec), Some(prop_spec)) =
            (field_by_block(block::TCAM_ROW_INPUT_CTL), field_by_block(block::TCAM_TABLE_PROP))
        else {
            return Ok(Self::empty());
        };

        let mut units = Vec::with_capacity(TCAM_ROWS * TCAM_COLS);
        for col in 0..TCAM_COLS {
            for row in 0..TCAM_ROWS {
                let prop = TcamTableProp::decode(regs.get(prop_spec, row, col, 0) as u16);
                let (group, halfbyte, halfbyte_en) = TcamRowInput::decode(regs.get(input_spec, row, col, 0) as u16);
                if prop.enabled && (group as usize >= TCAM_GROUPS || (halfbyte_en && halfbyte as usize >= TCAM_HALFBYTES)) {
                    return Err(ConfigError::InvalidTcamInput { row: row as u8, col: col as u8, group, halfbyte });
                }
                units.push(TcamUnit {
                    row: row as u8,
                    col: col as u8,
                    input: TcamRowInput { group, halfbyte: halfbyte_en.then_some(halfbyte) },
                    prop,
                    entries: BTreeMap::new(),
                });
            }
        }

        let mut array = Self { units, payload_bit: true };
        for (addr, (w0, w1)) in regs.memory_words(block::TCAM) {
            if let Some(unit) = array.unit_mut(addr.i0 as usize, addr.i1 as usize) {
                unit.entries.insert(addr.i2, TcamEntry::new(w0 as u64, w1 as u64));
            }
        }
        Ok(array)
    }

    fn empty() -> Self {
        Self { units: Vec::new(), payload_bit: true }
    }

    pub fn unit(&self, row: usize, col: usize) -> Option<&TcamUnit> {
        if row >= TCAM_ROWS || col >= TCAM_COLS {
            return None;
        }
        self.units.get(col * TCAM_ROWS + row)
    }

    fn unit_mut(&mut self, row: usize, col: usize) -> Option<&mut TcamUnit> {
        if row >= TCAM_ROWS || col >= TCAM_COLS {
            return None;
        }
        self.units.get_mut(col * TCAM_ROWS + row)
    }

    /// Enabled TCAMs that report hits.
    pub fn heads(&self) -> impl Iterator<Item = &TcamUnit> {
        self.units.iter().filter(|u| u.prop.enabled && !u.prop.chain)
    }

    /// Whether any TCAM reports for a logical table.
    pub fn serves(&self, logical_table: u8) -> bool {
        self.heads().any(|u| u.prop.logical_table == logical_table)
    }

    /// Check chains and priority uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for unit in self.units.iter().filter(|u| u.prop.enabled && u.prop.chain) {
            let up = self.unit(unit.row as usize + 1, unit.col as usize);
            if !up.is_some_and(|u| u.prop.enabled) {
                return Err(ConfigError::BrokenTcamChain { row: unit.row, col: unit.col });
            }
        }

        let mut seen: BTreeMap<(u8, u8), (u8, u8)> = BTreeMap::new();
        for head in self.heads() {
            let key = (head.prop.logical_table, head.prop.priority);
            if let Some(&first) = seen.get(&key) {
                return Err(ConfigError::AmbiguousTcamPriority {
                    logical_table: key.0,
                    priority: key.1,
                    first,
                    second: (head.row, head.col),
                });
            }
            seen.insert(key, (head.row, head.col));
        }
        Ok(())
    }

    /// TCAMs whose match vectors are ANDed into `head`, head first.
    fn chain_members<'a>(&'a self, head: &'a TcamUnit) -> Vec<&'a TcamUnit> {
        let mut members = vec![head];
        let mut row = head.row as usize;
        while row > 0 {
            match self.unit(row - 1, head.col as usize) {
                Some(below) if below.prop.enabled && below.prop.chain => {
                    members.push(below);
                    row -= 1;
                }
                _ => break,
            }
        }
        members
    }

    /// Lowest matching entry of one chain.
    fn lookup_chain(&self, head: &TcamUnit, input: &MatchInput) -> Option<(u16, u8)> {
        let members = self.chain_members(head);
        let keys: Vec<u64> = members.iter().map(|m| m.key(input, self.payload_bit)).collect();

        head.entries().find_map(|(index, entry)| {
            if !entry.matches(keys[0]) {
                return None;
            }
            let all = members[1..].iter().zip(&keys[1..]).all(|(m, k)| m.entry(index).is_some_and(|e| e.matches(*k)));
            all.then_some((index, entry.version()))
        })
    }

    /// Highest-priority hit for a logical table.
    pub fn lookup(&self, logical_table: u8, input: &MatchInput) -> Option<TcamHit> {
        self.heads()
            .filter(|h| h.prop.logical_table == logical_table)
            .filter_map(|head| {
                let (index, version) = self.lookup_chain(head, input)?;
                log::trace!("tcam({},{}) hit index {}", head.row, head.col, index);
                Some(TcamHit {
                    row: head.row,
                    col: head.col,
                    index,
                    priority: ((head.prop.priority as u16) << 9) | index,
                    version,
                    match_adr: ((head.col as u32) << 13) | ((head.row as u32) << 9) | index as u32,
                })
            })
            .min_by_key(|hit| hit.priority)
    }

    /// Number of programmed entries.
    pub fn entries_len(&self) -> usize {
        self.units.iter().map(|u| u.entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::phv::Phv;
    use crate::device::registers::RegAddress;
    use crate::mau::input_xbar::InputXbarConfig;

    fn xbar_ctl(container: u16, byte: u16) -> u128 {
        (1 | (byte << 1) | (container << 3)) as u128
    }

    /// Key bytes 0..4 from W1 bytes 0..3 and B0; midbyte from B1.
    fn wire_group0(regs: &mut RegisterFile) {
        for b in 0..4 {
            regs.write_field("match_input_xbar_tcam_ctl", [b, 0, 0], xbar_ctl(1, b)).unwrap();
        }
        regs.write_field("match_input_xbar_tcam_ctl", [4, 0, 0], xbar_ctl(64, 0)).unwrap();
        regs.write_field("match_input_xbar_tcam_ctl", [60, 0, 0], xbar_ctl(65, 0)).unwrap();
    }

    fn prop(lt: u8, priority: u8, chain: bool) -> u128 {
        TcamTableProp { enabled: true, logical_table: lt, priority, chain }.encode() as u128
    }

    fn phv_with_key(key40: u64, nibble: u8) -> Phv {
        let mut phv = Phv::ingress();
        phv.set_id(1, key40 as u32).unwrap();
        phv.set_id(64, (key40 >> 32) as u32 & 0xFF).unwrap();
        phv.set_id(65, nibble as u32).unwrap();
        phv
    }

    fn lookup(regs: &RegisterFile, lt: u8, phv: &Phv) -> Option<TcamHit> {
        let xbar = InputXbarConfig::decode(regs).unwrap();
        let tcam = TcamArray::decode(regs).unwrap();
        tcam.validate().unwrap();
        tcam.lookup(lt, &MatchInput::gather(&xbar, phv))
    }

    #[test]
    fn test_ternary_encoding() {
        let e = TcamEntry::new(0x0000_0c73_015a_79bd, 0x0000_138c_fea5_8643);
        assert_eq!(e.mask(), 0x1fff_ffff_fffe);
        assert_eq!(e.value() >> 1, 0x9c6_7f52_c321);
        assert_eq!(e.version(), 0);
        assert!(e.matches(search_key([0x21, 0xc3, 0x52, 0x7f, 0xc6], 0x9, true)));
        assert!(e.matches(search_key([0x21, 0xc3, 0x52, 0x7f, 0xc6], 0x9, false)));
        assert!(!e.matches(search_key([0x20, 0xc3, 0x52, 0x7f, 0xc6], 0x9, true)));
    }

    #[test]
    fn test_unwritten_entry_never_matches() {
        let e = TcamEntry::default();
        assert!(!e.matches(0));
        assert!(!e.matches(TCAM_KEY_MASK));
    }

    #[test]
    fn test_from_value_mask() {
        let e = TcamEntry::from_value_mask(0x1234 << 1, 0xFF00 << 1, 2);
        assert_eq!(e.version(), 2);
        assert!(e.matches(0x12FF << 1));
        assert!(!e.matches(0x13FF << 1));
    }

    #[test]
    fn test_scenario_index_280() {
        let mut regs = RegisterFile::new();
        wire_group0(&mut regs);
        regs.write_field("tcam_row_input_ctl", [0, 0, 0], TcamRowInput { group: 0, halfbyte: Some(0) }.encode() as u128).unwrap();
        regs.write_field("tcam_table_prop", [0, 0, 0], prop(3, 1, false)).unwrap();
        regs.indirect_write(RegAddress::encode(block::TCAM, 0, 0, 280), 0x0000_0c73_015a_79bd, 0x0000_138c_fea5_8643).unwrap();

        let hit = lookup(&regs, 3, &phv_with_key(0xc6_7f52_c321, 0x9)).unwrap();
        assert_eq!((hit.row, hit.col, hit.index), (0, 0, 280));
        assert_eq!(hit.priority, (1 << 9) | 280);
        assert_eq!(hit.match_adr, 280);
        assert_eq!(hit.version, 0);

        assert!(lookup(&regs, 3, &phv_with_key(0xc6_7f52_c320, 0x9)).is_none());
        assert!(lookup(&regs, 4, &phv_with_key(0xc6_7f52_c321, 0x9)).is_none());
    }

    #[test]
    fn test_priority_across_tcams() {
        let mut regs = RegisterFile::new();
        wire_group0(&mut regs);
        regs.write_field("tcam_table_prop", [0, 0, 0], prop(1, 2, false)).unwrap();
        regs.write_field("tcam_table_prop", [1, 0, 0], prop(1, 1, false)).unwrap();
        let any = TcamEntry::from_value_mask(0, 0, 0);
        regs.indirect_write(RegAddress::encode(block::TCAM, 0, 0, 0), any.word0 as u128, any.word1 as u128).unwrap();
        regs.indirect_write(RegAddress::encode(block::TCAM, 1, 0, 7), any.word0 as u128, any.word1 as u128).unwrap();

        let hit = lookup(&regs, 1, &phv_with_key(0, 0)).unwrap();
        assert_eq!((hit.row, hit.index), (1, 7));
    }

    #[test]
    fn test_lowest_index_wins_within_tcam() {
        let mut regs = RegisterFile::new();
        wire_group0(&mut regs);
        regs.write_field("tcam_table_prop", [0, 1, 0], prop(2, 0, false)).unwrap();
        let exact = TcamEntry::from_value_mask(0x55 << 1, 0xFF << 1, 1);
        let any = TcamEntry::from_value_mask(0, 0, 0);
        regs.indirect_write(RegAddress::encode(block::TCAM, 0, 1, 10), exact.word0 as u128, exact.word1 as u128).unwrap();
        regs.indirect_write(RegAddress::encode(block::TCAM, 0, 1, 20), any.word0 as u128, any.word1 as u128).unwrap();

        let hit = lookup(&regs, 2, &phv_with_key(0x55, 0)).unwrap();
        assert_eq!(hit.index, 10);
        assert_eq!(hit.version, 1);
        assert_eq!(hit.match_adr, (1 << 13) | 10);

        let hit = lookup(&regs, 2, &phv_with_key(0x56, 0)).unwrap();
        assert_eq!(hit.index, 20);
    }

    #[test]
    fn test_ambiguous_priority_rejected() {
        let mut regs = RegisterFile::new();
        regs.write_field("tcam_table_prop", [0, 0, 0], prop(5, 3, false)).unwrap();
        regs.write_field("tcam_table_prop", [4, 1, 0], prop(5, 3, false)).unwrap();
        let tcam = TcamArray::decode(&regs).unwrap();
        assert_eq!(
            tcam.validate(),
            Err(ConfigError::AmbiguousTcamPriority { logical_table: 5, priority: 3, first: (0, 0), second: (4, 1) })
        );
    }

    #[test]
    fn test_chain() {
        let mut regs = RegisterFile::new();
        wire_group0(&mut regs);
        // group 1 (bytes 5..10) driven by W2
        for b in 0..4 {
            regs.write_field("match_input_xbar_tcam_ctl", [5 + b, 0, 0], xbar_ctl(2, b)).unwrap();
        }
        regs.write_field("tcam_row_input_ctl", [0, 0, 0], 0).unwrap();
        regs.write_field("tcam_row_input_ctl", [1, 0, 0], 1).unwrap();
        regs.write_field("tcam_table_prop", [0, 0, 0], prop(0, 0, true)).unwrap();
        regs.write_field("tcam_table_prop", [1, 0, 0], prop(0, 0, false)).unwrap();

        let low = TcamEntry::from_value_mask(0x11 << 1, 0xFF << 1, 0);
        let high = TcamEntry::from_value_mask(0x22 << 1, 0xFF << 1, 0);
        regs.indirect_write(RegAddress::encode(block::TCAM, 0, 0, 3), low.word0 as u128, low.word1 as u128).unwrap();
        regs.indirect_write(RegAddress::encode(block::TCAM, 1, 0, 3), high.word0 as u128, high.word1 as u128).unwrap();

        let mut phv = phv_with_key(0x11, 0);
        phv.set_id(2, 0x22).unwrap();
        let hit = lookup(&regs, 0, &phv).unwrap();
        assert_eq!((hit.row, hit.index), (1, 3));

        phv.set_id(2, 0x23).unwrap();
        assert!(lookup(&regs, 0, &phv).is_none());
    }

    #[test]
    fn test_broken_chain_rejected() {
        let mut regs = RegisterFile::new();
        regs.write_field("tcam_table_prop", [11, 0, 0], prop(0, 0, true)).unwrap();
        let tcam = TcamArray::decode(&regs).unwrap();
        assert_eq!(tcam.validate(), Err(ConfigError::BrokenTcamChain { row: 11, col: 0 }));
    }

    #[test]
    fn test_invalid_group_rejected() {
        let mut regs = RegisterFile::new();
        regs.write_field("tcam_row_input_ctl", [2, 0, 0], 12).unwrap();
        regs.write_field("tcam_table_prop", [2, 0, 0], prop(0, 0, false)).unwrap();
        assert!(matches!(TcamArray::decode(&regs), Err(ConfigError::InvalidTcamInput { row: 2, group: 12, .. })));
    }
}
