//! Address distribution.
//!
//! Turns a logical table's match outcome into the seven resource addresses
//! that drive the rest of the stage (stats, meter, idletime, action data,
//! action instruction, immediate data and next table).
//!
//! # Resolution
//!
//! For each resource kind of a logical table:
//!
//! 1. enable mux disabled: `default`, hit or miss
//! 2. miss: `miss_value`
//! 3. TCAM hit, action-bit map enabled, `match_adr & map_data[col] == 0`:
//!    `miss_value`
//! 4. per-entry mux and the entry's overhead enable bit clear: `miss_value`
//! 5. otherwise `(source >> shiftcount) & mask`
//!
//! The source is the match address for the direct kinds and the overhead
//! field for instruction, immediate data and next table.
//!
//! # TCAM Output Maps
//!
//! A TCAM hit's physical match address is `col << 13 | row << 9 | index`.
//! When `tcam_match_adr_to_physical_oxbar_outputmap[row][col]` is enabled
//! (`enabled[0] | prefix[5:1]`), address distribution sees
//! `prefix << 9 | index` instead, for steps 3 and 5 alike. Tind lookups keep
//! the physical address.
//!
//! `tcam_hit_to_logical_table_ixbar_outputmap[L]` (`enabled[0] |
//! logical_table[4:1]`) picks which logical table's `next_table_map_en` bit
//! and `next_table_map_data` row translate the next table of a TCAM hit in
//! table L. Exact hits and misses always use L's own row.
//!
//! # Overhead
//!
//! ```text
//!  63     50 49          18 17     14 13        6 5         0
//! +---------+--------------+---------+-----------+-----------+
//! | unused  |  immediate   | enables | next tbl  | instr adr |
//! +---------+--------------+---------+-----------+-----------+
//!   enables: stats[14] meter[15] idletime[16] action data[17]
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{
    self, block, field_by_block, resource_kind, resource_reg, FieldSpec, LOGICAL_TABLES, NEXT_TABLE_MAP_ENTRIES, TCAM_COLS,
    TCAM_ROWS, TIND_BUSES,
};
use crate::error::ConfigError;
use crate::mau::exact::ExactHit;
use crate::mau::sram::SramArray;
use crate::mau::tcam::TcamHit;

/// Resource addressed by a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Stats,
    Meter,
    Idletime,
    ActionData,
    ActionInstruction,
    ImmediateData,
    NextTable,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Stats,
        ResourceKind::Meter,
        ResourceKind::Idletime,
        ResourceKind::ActionData,
        ResourceKind::ActionInstruction,
        ResourceKind::ImmediateData,
        ResourceKind::NextTable,
    ];

    /// Kind number in the register map.
    pub fn index(self) -> u8 {
        match self {
            ResourceKind::Stats => resource_kind::STATS,
            ResourceKind::Meter => resource_kind::METER,
            ResourceKind::Idletime => resource_kind::IDLETIME,
            ResourceKind::ActionData => resource_kind::ACTION_DATA,
            ResourceKind::ActionInstruction => resource_kind::ACTION_INSTRUCTION,
            ResourceKind::ImmediateData => resource_kind::IMMEDIATE_DATA,
            ResourceKind::NextTable => resource_kind::NEXT_TABLE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Stats => "stats",
            ResourceKind::Meter => "meter",
            ResourceKind::Idletime => "idletime",
            ResourceKind::ActionData => "action_data",
            ResourceKind::ActionInstruction => "action_instruction",
            ResourceKind::ImmediateData => "immediate_data",
            ResourceKind::NextTable => "next_table",
        }
    }

    /// Address width in bits.
    pub fn width(self) -> u8 {
        match self {
            ResourceKind::Stats => 19,
            ResourceKind::Meter => 23,
            ResourceKind::Idletime => 20,
            ResourceKind::ActionData => 22,
            ResourceKind::ActionInstruction => 6,
            ResourceKind::ImmediateData => 32,
            ResourceKind::NextTable => 8,
        }
    }

    /// Addressed directly by the match address.
    pub fn is_direct(self) -> bool {
        matches!(
            self,
            ResourceKind::Stats | ResourceKind::Meter | ResourceKind::Idletime | ResourceKind::ActionData
        )
    }

    /// Register spec of one of this kind's address-map registers.
    pub fn field(self, reg: u8) -> Option<&'static FieldSpec> {
        field_by_block(registers_spec::resource_block(self.index(), reg))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `per_entry_en_mux_ctl` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnableMux {
    #[default]
    Disabled,
    Always,
    PerEntry,
}

impl EnableMux {
    pub fn decode(kind: ResourceKind, logical_table: u8, value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(EnableMux::Disabled),
            1 => Ok(EnableMux::Always),
            2 if kind.is_direct() => Ok(EnableMux::PerEntry),
            _ => Err(ConfigError::InvalidEnableMux { kind: kind.name(), logical_table, value }),
        }
    }

    pub fn encode(self) -> u8 {
        match self {
            EnableMux::Disabled => 0,
            EnableMux::Always => 1,
            EnableMux::PerEntry => 2,
        }
    }
}

/// Match overhead word carried by exact entries and tind words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Overhead(u64);

impl Overhead {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Assemble an overhead word.
    pub fn build(action_instr: u8, next_table: u8, enables: &[ResourceKind], immediate: u32) -> Self {
        let mut raw = (action_instr as u64 & 0x3F) | ((next_table as u64) << 6) | ((immediate as u64) << 18);
        for kind in enables {
            if let Some(bit) = Self::enable_bit(*kind) {
                raw |= 1 << bit;
            }
        }
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn action_instr(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    pub fn next_table(self) -> u8 {
        ((self.0 >> 6) & 0xFF) as u8
    }

    pub fn immediate(self) -> u32 {
        ((self.0 >> 18) & 0xFFFF_FFFF) as u32
    }

    fn enable_bit(kind: ResourceKind) -> Option<u32> {
        match kind {
            ResourceKind::Stats => Some(14),
            ResourceKind::Meter => Some(15),
            ResourceKind::Idletime => Some(16),
            ResourceKind::ActionData => Some(17),
            _ => None,
        }
    }

    /// Per-entry enable bit of a direct resource.
    pub fn enabled(self, kind: ResourceKind) -> bool {
        Self::enable_bit(kind).is_some_and(|bit| self.0 & (1 << bit) != 0)
    }

    /// Overhead field feeding an indirect resource.
    pub fn field(self, kind: ResourceKind) -> Option<u64> {
        match kind {
            ResourceKind::ActionInstruction => Some(self.action_instr() as u64),
            ResourceKind::ImmediateData => Some(self.immediate() as u64),
            ResourceKind::NextTable => Some(self.next_table() as u64),
            _ => None,
        }
    }
}

/// What a logical table's lookup produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Miss,
    Tcam { hit: TcamHit, overhead: Overhead },
    Exact { hit: ExactHit },
}

impl MatchOutcome {
    pub fn is_hit(&self) -> bool {
        !matches!(self, MatchOutcome::Miss)
    }

    pub fn match_adr(&self) -> Option<u32> {
        match self {
            MatchOutcome::Miss => None,
            MatchOutcome::Tcam { hit, .. } => Some(hit.match_adr),
            MatchOutcome::Exact { hit } => Some(hit.match_adr),
        }
    }

    pub fn overhead(&self) -> Option<Overhead> {
        match self {
            MatchOutcome::Miss => None,
            MatchOutcome::Tcam { overhead, .. } => Some(*overhead),
            MatchOutcome::Exact { hit } => Some(hit.entry.overhead),
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Miss => write!(f, "miss"),
            MatchOutcome::Tcam { hit, .. } => {
                write!(f, "tcam({},{})[{}] prio 0x{:X}", hit.row, hit.col, hit.index, hit.priority)
            }
            MatchOutcome::Exact { hit } => {
                write!(f, "way {} ({},{})[{}]", hit.way, hit.row, hit.col, hit.index)
            }
        }
    }
}

/// Address-map registers of one kind and logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceRule {
    pub mux: EnableMux,
    pub default: u32,
    pub miss_value: u32,
    pub tcam_shift: u8,
    pub exact_shift: u8,
    pub mask: u32,
    /// Action-bit map data by TCAM column, when enabled for the table
    pub actionbit: Option<[u16; TCAM_COLS]>,
}

impl ResourceRule {
    /// `match_adr` is the address as seen after the TCAM output map.
    fn resolve(&self, kind: ResourceKind, outcome: &MatchOutcome, match_adr: u32) -> u32 {
        if self.mux == EnableMux::Disabled {
            return self.default;
        }
        let (shift, col) = match outcome {
            MatchOutcome::Miss => return self.miss_value,
            MatchOutcome::Tcam { hit, .. } => (self.tcam_shift, Some(hit.col)),
            MatchOutcome::Exact { .. } => (self.exact_shift, None),
        };

        if let (Some(map), Some(col)) = (self.actionbit, col) {
            if match_adr & map[col as usize] as u32 == 0 {
                return self.miss_value;
            }
        }

        let overhead = outcome.overhead().unwrap_or_default();
        if self.mux == EnableMux::PerEntry && !overhead.enabled(kind) {
            return self.miss_value;
        }

        let source = match overhead.field(kind) {
            Some(field) => field,
            None => match_adr as u64,
        };
        let shifted = if shift >= 64 { 0 } else { source >> shift };
        (shifted as u32) & self.mask
    }
}

/// Resolved addresses of one logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceAddresses {
    values: [u32; 7],
    /// Bit per kind: mux not disabled
    active: u8,
}

impl ResourceAddresses {
    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.values[kind.index() as usize]
    }

    /// Whether the kind's enable mux is on, so the address reaches its resource.
    pub fn is_active(&self, kind: ResourceKind) -> bool {
        self.active & (1 << kind.index()) != 0
    }

    fn set(&mut self, kind: ResourceKind, value: u32, active: bool) {
        self.values[kind.index() as usize] = value;
        if active {
            self.active |= 1 << kind.index();
        }
    }
}

impl fmt::Display for ResourceAddresses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in ResourceKind::ALL {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}=0x{:X}", kind, self.get(kind))?;
        }
        Ok(())
    }
}

/// `tind_bus_prop`: ternary indirection unit for a logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TindBus {
    pub bus: u8,
    pub ram_row: u8,
    pub ram_col: u8,
}

impl TindBus {
    /// `tind_bus_prop` word routing this unit to a logical table.
    pub fn encode(&self, logical_table: u8) -> u16 {
        1 | ((logical_table as u16 & 0xF) << 1) | ((self.ram_row as u16 & 0x7) << 5) | ((self.ram_col as u16 & 0xF) << 8)
    }
}

/// Decoded address distribution registers.
#[derive(Debug, Clone)]
pub struct AddressMapConfig {
    /// Indexed by kind, then logical table
    rules: Vec<[ResourceRule; LOGICAL_TABLES]>,
    next_table_map_en: u16,
    next_table_map: [[u8; NEXT_TABLE_MAP_ENTRIES]; LOGICAL_TABLES],
    /// Match address prefix per physical TCAM, when remapped
    oxbar_outputmap: [[Option<u8>; TCAM_COLS]; TCAM_ROWS],
    /// Next-table map row for TCAM hits, when redirected
    ixbar_outputmap: [Option<u8>; LOGICAL_TABLES],
    tind: BTreeMap<u8, TindBus>,
    tind_conflict: Option<ConfigError>,
}

impl Default for AddressMapConfig {
    fn default() -> Self {
        Self {
            rules: vec![[ResourceRule::default(); LOGICAL_TABLES]; ResourceKind::ALL.len()],
            next_table_map_en: 0,
            next_table_map: [[0; NEXT_TABLE_MAP_ENTRIES]; LOGICAL_TABLES],
            oxbar_outputmap: [[None; TCAM_COLS]; TCAM_ROWS],
            ixbar_outputmap: [None; LOGICAL_TABLES],
            tind: BTreeMap::new(),
            tind_conflict: None,
        }
    }
}

impl AddressMapConfig {
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for kind in ResourceKind::ALL {
            let specs = (
                kind.field(resource_reg::PER_ENTRY_EN_MUX_CTL),
                kind.field(resource_reg::DEFAULT),
                kind.field(resource_reg::MISS_VALUE),
                kind.field(resource_reg::TCAM_SHIFTCOUNT),
                kind.field(resource_reg::EXACT_SHIFTCOUNT),
                kind.field(resource_reg::MASK),
                kind.field(resource_reg::TCAM_ACTIONBIT_MAP_EN),
                kind.field(resource_reg::TCAM_ACTIONBIT_MAP_DATA),
            );
            let (Some(mux), Some(default), Some(miss), Some(tshift), Some(eshift), Some(mask), Some(ab_en), Some(ab_data)) =
                specs
            else {
                continue;
            };

            let actionbit_en = regs.get(ab_en, 0, 0, 0) as u16;
            for lt in 0..LOGICAL_TABLES {
                let rule = &mut config.rules[kind.index() as usize][lt];
                *rule = ResourceRule {
                    mux: EnableMux::decode(kind, lt as u8, regs.get(mux, lt, 0, 0) as u8)?,
                    default: regs.get_u32(default, lt, 0, 0),
                    miss_value: regs.get_u32(miss, lt, 0, 0),
                    tcam_shift: regs.get(tshift, lt, 0, 0) as u8,
                    exact_shift: regs.get(eshift, lt, 0, 0) as u8,
                    mask: regs.get_u32(mask, lt, 0, 0),
                    actionbit: None,
                };
                if actionbit_en & (1 << lt) != 0 {
                    let mut map = [0u16; TCAM_COLS];
                    for (col, m) in map.iter_mut().enumerate() {
                        *m = regs.get(ab_data, lt, col, 0) as u16;
                    }
                    rule.actionbit = Some(map);
                }
            }
        }

        if let (Some(en), Some(data)) = (field_by_block(block::NEXT_TABLE_MAP_EN), field_by_block(block::NEXT_TABLE_MAP_DATA)) {
            config.next_table_map_en = regs.get(en, 0, 0, 0) as u16;
            for (lt, entries) in config.next_table_map.iter_mut().enumerate() {
                for (i, e) in entries.iter_mut().enumerate() {
                    *e = regs.get(data, lt, i, 0) as u8;
                }
            }
        }

        if let Some(spec) = field_by_block(block::TCAM_MATCH_ADR_OXBAR_OUTPUTMAP) {
            for (row, cols) in config.oxbar_outputmap.iter_mut().enumerate() {
                for (col, prefix) in cols.iter_mut().enumerate() {
                    let ctl = regs.get(spec, row, col, 0) as u8;
                    *prefix = (ctl & 1 != 0).then_some(ctl >> 1);
                }
            }
        }

        if let Some(spec) = field_by_block(block::TCAM_HIT_IXBAR_OUTPUTMAP) {
            for (lt, target) in config.ixbar_outputmap.iter_mut().enumerate() {
                let ctl = regs.get(spec, lt, 0, 0) as u8;
                *target = (ctl & 1 != 0).then_some(ctl >> 1);
            }
        }

        if let Some(spec) = field_by_block(block::TIND_BUS_PROP) {
            for bus in 0..TIND_BUSES {
                let prop = regs.get(spec, bus, 0, 0) as u16;
                if prop & 1 == 0 {
                    continue;
                }
                let lt = ((prop >> 1) & 0xF) as u8;
                let tind = TindBus { bus: bus as u8, ram_row: ((prop >> 5) & 0x7) as u8, ram_col: ((prop >> 8) & 0xF) as u8 };
                if let Some(first) = config.tind.get(&lt) {
                    config.tind_conflict.get_or_insert(ConfigError::TindConflict {
                        logical_table: lt,
                        first: first.bus,
                        second: tind.bus,
                    });
                    continue;
                }
                config.tind.insert(lt, tind);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(err) = &self.tind_conflict {
            return Err(err.clone());
        }
        for (lt, tind) in &self.tind {
            if tind.ram_col as usize >= registers_spec::SRAM_COLS {
                return Err(ConfigError::RamUnitOutOfRange { way: tind.bus, row: tind.ram_row, col: tind.ram_col });
            }
            log::trace!("tind bus {} -> table {} unit ({},{})", tind.bus, lt, tind.ram_row, tind.ram_col);
        }
        Ok(())
    }

    pub fn rule(&self, kind: ResourceKind, logical_table: u8) -> &ResourceRule {
        &self.rules[kind.index() as usize][logical_table as usize]
    }

    pub fn rule_mut(&mut self, kind: ResourceKind, logical_table: u8) -> &mut ResourceRule {
        &mut self.rules[kind.index() as usize][logical_table as usize]
    }

    /// Overhead word for a TCAM hit, zero without a tind bus.
    pub fn tind_overhead(&self, logical_table: u8, hit: &TcamHit, sram: &SramArray) -> Overhead {
        self.tind
            .get(&logical_table)
            .map(|t| sram.tind_overhead(t.ram_row, t.ram_col, hit.match_adr))
            .unwrap_or_default()
    }

    /// Match address of a TCAM hit as address distribution sees it.
    pub fn tcam_resource_adr(&self, hit: &TcamHit) -> u32 {
        match self.oxbar_outputmap[hit.row as usize % TCAM_ROWS][hit.col as usize % TCAM_COLS] {
            Some(prefix) => ((prefix as u32) << 9) | (hit.index as u32 & 0x1FF),
            None => hit.match_adr,
        }
    }

    /// Logical table whose next-table map translates this outcome.
    pub fn next_table_row(&self, logical_table: u8, outcome: &MatchOutcome) -> u8 {
        match outcome {
            MatchOutcome::Tcam { .. } => self.ixbar_outputmap[logical_table as usize].unwrap_or(logical_table),
            _ => logical_table,
        }
    }

    /// Resolve every resource address of a logical table.
    pub fn resolve(&self, logical_table: u8, outcome: &MatchOutcome) -> ResourceAddresses {
        let match_adr = match outcome {
            MatchOutcome::Tcam { hit, .. } => self.tcam_resource_adr(hit),
            other => other.match_adr().unwrap_or(0),
        };
        let map_row = self.next_table_row(logical_table, outcome);

        let mut out = ResourceAddresses::default();
        for kind in ResourceKind::ALL {
            let rule = self.rule(kind, logical_table);
            let mut value = rule.resolve(kind, outcome, match_adr);
            if kind == ResourceKind::NextTable && self.next_table_map_en & (1 << map_row) != 0 {
                value = self.next_table_map[map_row as usize][(value & 0x7) as usize] as u32;
            }
            out.set(kind, value, rule.mux != EnableMux::Disabled);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mau::sram::ExactEntry;

    fn tcam_hit(col: u8, row: u8, index: u16) -> TcamHit {
        TcamHit {
            row,
            col,
            index,
            priority: index,
            version: 0,
            match_adr: ((col as u32) << 13) | ((row as u32) << 9) | index as u32,
        }
    }

    fn exact_hit(match_adr: u32, overhead: Overhead) -> ExactHit {
        ExactHit {
            way: 0,
            row: 0,
            col: 0,
            index: match_adr as u16,
            hash: Default::default(),
            match_adr,
            entry: ExactEntry { match_bytes: [0; 16], valid: true, version: 0, overhead },
        }
    }

    #[test]
    fn test_overhead_fields() {
        let o = Overhead::build(0x2A, 0x13, &[ResourceKind::Stats, ResourceKind::ActionData], 0xDEAD_BEEF);
        assert_eq!(o.action_instr(), 0x2A);
        assert_eq!(o.next_table(), 0x13);
        assert_eq!(o.immediate(), 0xDEAD_BEEF);
        assert!(o.enabled(ResourceKind::Stats));
        assert!(!o.enabled(ResourceKind::Meter));
        assert!(o.enabled(ResourceKind::ActionData));
        assert!(!o.enabled(ResourceKind::ActionInstruction));
    }

    #[test]
    fn test_enable_mux_decode() {
        assert_eq!(EnableMux::decode(ResourceKind::Stats, 0, 2), Ok(EnableMux::PerEntry));
        assert!(EnableMux::decode(ResourceKind::NextTable, 3, 2).is_err());
        assert_eq!(
            EnableMux::decode(ResourceKind::Meter, 4, 3),
            Err(ConfigError::InvalidEnableMux { kind: "meter", logical_table: 4, value: 3 })
        );
    }

    #[test]
    fn test_disabled_mux_uses_default() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_action_instruction_adr_default", [7, 0, 0], 0x15).unwrap();
        regs.write_field("mau_action_instruction_adr_miss_value", [7, 0, 0], 0x3).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        let hit = MatchOutcome::Tcam { hit: tcam_hit(0, 0, 280), overhead: Overhead::build(9, 0, &[], 0) };
        assert_eq!(config.resolve(7, &hit).get(ResourceKind::ActionInstruction), 0x15);
        assert_eq!(config.resolve(7, &MatchOutcome::Miss).get(ResourceKind::ActionInstruction), 0x15);
        assert!(!config.resolve(7, &MatchOutcome::Miss).is_active(ResourceKind::ActionInstruction));
    }

    #[test]
    fn test_miss_value_on_miss() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_meter_adr_per_entry_en_mux_ctl", [1, 0, 0], 1).unwrap();
        regs.write_field("mau_meter_adr_miss_value", [1, 0, 0], 0x77).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();
        let addrs = config.resolve(1, &MatchOutcome::Miss);
        assert_eq!(addrs.get(ResourceKind::Meter), 0x77);
        assert!(addrs.is_active(ResourceKind::Meter));
    }

    #[test]
    fn test_actionbit_map() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_stats_adr_per_entry_en_mux_ctl", [12, 0, 0], 1).unwrap();
        regs.write_field("mau_stats_adr_miss_value", [12, 0, 0], 0x4d).unwrap();
        regs.write_field("mau_stats_adr_tcam_actionbit_map_en", [0, 0, 0], 0x1000).unwrap();
        regs.write_field("mau_stats_adr_tcam_actionbit_map_data", [12, 0, 0], 0xf110).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        // 280 = 0x118 shares bit 4 and bit 8 with 0xf110
        let hit = MatchOutcome::Tcam { hit: tcam_hit(0, 0, 280), overhead: Overhead::default() };
        assert_eq!(config.resolve(12, &hit).get(ResourceKind::Stats), 280);

        // 0x0a0 & 0xf110 == 0
        let hit = MatchOutcome::Tcam { hit: tcam_hit(0, 0, 0x0a0), overhead: Overhead::default() };
        assert_eq!(config.resolve(12, &hit).get(ResourceKind::Stats), 0x4d);
    }

    #[test]
    fn test_per_entry_enable() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_idletime_adr_per_entry_en_mux_ctl", [0, 0, 0], 2).unwrap();
        regs.write_field("mau_idletime_adr_miss_value", [0, 0, 0], 0x9).unwrap();
        regs.write_field("mau_idletime_adr_exact_shiftcount", [0, 0, 0], 2).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        let on = MatchOutcome::Exact { hit: exact_hit(0x4010, Overhead::build(0, 0, &[ResourceKind::Idletime], 0)) };
        assert_eq!(config.resolve(0, &on).get(ResourceKind::Idletime), 0x1004);

        let off = MatchOutcome::Exact { hit: exact_hit(0x4010, Overhead::default()) };
        assert_eq!(config.resolve(0, &off).get(ResourceKind::Idletime), 0x9);
    }

    #[test]
    fn test_overhead_sources_and_mask() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_immediate_data_adr_per_entry_en_mux_ctl", [2, 0, 0], 1).unwrap();
        regs.write_field("mau_immediate_data_adr_exact_shiftcount", [2, 0, 0], 8).unwrap();
        regs.write_field("mau_immediate_data_adr_mask", [2, 0, 0], 0xFF).unwrap();
        regs.write_field("mau_action_instruction_adr_per_entry_en_mux_ctl", [2, 0, 0], 1).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        let hit = MatchOutcome::Exact { hit: exact_hit(1, Overhead::build(0x21, 0, &[], 0x00AB_CD00)) };
        let addrs = config.resolve(2, &hit);
        assert_eq!(addrs.get(ResourceKind::ImmediateData), 0xCD);
        assert_eq!(addrs.get(ResourceKind::ActionInstruction), 0x21);
    }

    #[test]
    fn test_next_table_map() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_next_table_adr_per_entry_en_mux_ctl", [4, 0, 0], 1).unwrap();
        regs.write_field("next_table_map_en", [0, 0, 0], 1 << 4).unwrap();
        regs.write_field("next_table_map_data", [4, 3, 0], 0x42).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        let hit = MatchOutcome::Exact { hit: exact_hit(1, Overhead::build(0, 0x0B, &[], 0)) };
        assert_eq!(config.resolve(4, &hit).get(ResourceKind::NextTable), 0x42);
    }

    #[test]
    fn test_oxbar_outputmap_relocates_tcam_address() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_stats_adr_per_entry_en_mux_ctl", [3, 0, 0], 1).unwrap();
        regs.write_field("mau_stats_adr_tcam_shiftcount", [3, 0, 0], 1).unwrap();
        // tcam (5, 1) reports as prefix 2
        regs.write_field("tcam_match_adr_to_physical_oxbar_outputmap", [5, 1, 0], 1 | (2 << 1)).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();

        let mapped = tcam_hit(1, 5, 0x21);
        assert_eq!(mapped.match_adr, 0x2A21);
        assert_eq!(config.tcam_resource_adr(&mapped), 0x421);
        let hit = MatchOutcome::Tcam { hit: mapped, overhead: Overhead::default() };
        assert_eq!(config.resolve(3, &hit).get(ResourceKind::Stats), 0x210);

        // other TCAMs keep the physical address
        let hit = MatchOutcome::Tcam { hit: tcam_hit(0, 5, 0x21), overhead: Overhead::default() };
        assert_eq!(config.resolve(3, &hit).get(ResourceKind::Stats), 0xA21 >> 1);
    }

    #[test]
    fn test_oxbar_outputmap_feeds_actionbit_check() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_meter_adr_per_entry_en_mux_ctl", [0, 0, 0], 1).unwrap();
        regs.write_field("mau_meter_adr_miss_value", [0, 0, 0], 0x5).unwrap();
        regs.write_field("mau_meter_adr_tcam_actionbit_map_en", [0, 0, 0], 1).unwrap();
        regs.write_field("mau_meter_adr_tcam_actionbit_map_data", [0, 1, 0], 0x2000).unwrap();
        let hit = MatchOutcome::Tcam { hit: tcam_hit(1, 0, 7), overhead: Overhead::default() };

        // physical address 0x2007 carries the column bit
        let config = AddressMapConfig::decode(&regs).unwrap();
        assert_eq!(config.resolve(0, &hit).get(ResourceKind::Meter), 0x2007);

        regs.write_field("tcam_match_adr_to_physical_oxbar_outputmap", [0, 1, 0], 1).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();
        assert_eq!(config.resolve(0, &hit).get(ResourceKind::Meter), 0x5);
    }

    #[test]
    fn test_ixbar_outputmap_selects_next_table_row() {
        let mut regs = RegisterFile::new();
        regs.write_field("mau_next_table_adr_per_entry_en_mux_ctl", [4, 0, 0], 1).unwrap();
        regs.write_field("next_table_map_en", [0, 0, 0], (1 << 4) | (1 << 9)).unwrap();
        regs.write_field("next_table_map_data", [4, 3, 0], 0x42).unwrap();
        regs.write_field("next_table_map_data", [9, 3, 0], 0x99).unwrap();
        regs.write_field("tcam_hit_to_logical_table_ixbar_outputmap", [4, 0, 0], 1 | (9 << 1)).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();
        let overhead = Overhead::build(0, 0x0B, &[], 0);

        let tcam = MatchOutcome::Tcam { hit: tcam_hit(0, 0, 1), overhead };
        assert_eq!(config.next_table_row(4, &tcam), 9);
        assert_eq!(config.resolve(4, &tcam).get(ResourceKind::NextTable), 0x99);

        // exact hits are not routed through the TCAM hit map
        let exact = MatchOutcome::Exact { hit: exact_hit(1, overhead) };
        assert_eq!(config.resolve(4, &exact).get(ResourceKind::NextTable), 0x42);

        // redirected to a table without next_table_map_en: raw value
        regs.write_field("next_table_map_en", [0, 0, 0], 1 << 4).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();
        assert_eq!(config.resolve(4, &tcam).get(ResourceKind::NextTable), 0x0B);
    }

    #[test]
    fn test_tind_conflict() {
        let mut regs = RegisterFile::new();
        regs.write_field("tind_bus_prop", [1, 0, 0], 1 | (6 << 1)).unwrap();
        regs.write_field("tind_bus_prop", [5, 0, 0], 1 | (6 << 1) | (2 << 5)).unwrap();
        let config = AddressMapConfig::decode(&regs).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::TindConflict { logical_table: 6, first: 1, second: 5 }));
    }
}
