//! Programmatic stage fixtures.
//!
//! `FixtureBuilder` programs a register file through the same checked
//! write path a register blob uses, but in terms of the typed
//! configuration records instead of raw addresses. The first rejected write
//! is kept and returned by [`FixtureBuilder::build`]; later calls are no-ops.
//!
//! # Example
//!
//! ```
//! use mau_emu::device::{ContainerId, Phv};
//! use mau_emu::mau::{EnableMux, ResourceKind, TcamEntry};
//! use mau_emu::testing::FixtureBuilder;
//!
//! let w1: ContainerId = "W1".parse().unwrap();
//! let mut f = FixtureBuilder::new();
//! f.tcam_key_word(0, w1)
//!     .tcam_table(0, 0, 3, 1, false)
//!     .tcam_entry(0, 0, 7, TcamEntry::from_value_mask(0x42 << 1, 0xFF << 1, 0))
//!     .resource(ResourceKind::Stats, 3, EnableMux::Always, 0, 0x4d);
//! let mut stage = f.build_stage(&[]).unwrap();
//!
//! let mut phv = Phv::ingress();
//! phv.set(w1, 0x42).unwrap();
//! let out = stage.process(&phv);
//! assert!(out.table(3).unwrap().outcome.is_hit());
//! ```

use crate::device::phv::{ContainerId, ContainerWidth, Direction};
use crate::device::register_file::RegisterFile;
use crate::device::registers::RegAddress;
use crate::device::registers_spec::{block, resource_reg, NEXT_TABLE_MAP_ENTRIES};
use crate::error::ConfigError;
use crate::mau::action::Instruction;
use crate::mau::action_xbar::ActionHvXbarBuilder;
use crate::mau::address_dist::{EnableMux, Overhead, ResourceKind, TindBus};
use crate::mau::exact::{Swizzle, WayConfig};
use crate::mau::input_xbar::XbarSource;
use crate::mau::sram::ExactEntry;
use crate::mau::tcam::{TcamEntry, TcamRowInput, TcamTableProp};
use crate::mau::{HardwareErratum, MauStage};

/// Builds a programmed register file for one stage.
#[derive(Debug, Default)]
pub struct FixtureBuilder {
    regs: RegisterFile,
    xbar: ActionHvXbarBuilder,
    error: Option<ConfigError>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing register file.
    pub fn from_registers(regs: RegisterFile) -> Self {
        let xbar = ActionHvXbarBuilder::from_registers(&regs);
        Self { regs, xbar, error: None }
    }

    fn record(&mut self, result: Result<(), ConfigError>) -> &mut Self {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
        self
    }

    fn read(&self, name: &str, index: [u16; 3]) -> u128 {
        self.regs.read_field(name, index).unwrap_or(0)
    }

    /// Raw named register write.
    pub fn reg(&mut self, name: &str, index: [u16; 3], value: u128) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let result = self.regs.write_field(name, index, value);
        self.record(result)
    }

    fn memory(&mut self, block: u8, index: [u16; 3], word0: u128, word1: u128) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let result = self.regs.indirect_write(RegAddress::encode(block, index[0], index[1], index[2]), word0, word1);
        self.record(result)
    }

    // Match input crossbar

    pub fn exact_xbar(&mut self, slot: u16, container: ContainerId, byte: u8) -> &mut Self {
        let ctl = XbarSource { container, byte }.encode();
        self.reg("match_input_xbar_exact_ctl", [slot, 0, 0], ctl as u128)
    }

    pub fn tcam_xbar(&mut self, slot: u16, container: ContainerId, byte: u8) -> &mut Self {
        let ctl = XbarSource { container, byte }.encode();
        self.reg("match_input_xbar_tcam_ctl", [slot, 0, 0], ctl as u128)
    }

    /// Route a container's bytes, low byte first, into consecutive exact slots.
    pub fn exact_key(&mut self, first_slot: u16, container: ContainerId) -> &mut Self {
        for b in 0..container.width().bytes() as u16 {
            self.exact_xbar(first_slot + b, container, b as u8);
        }
        self
    }

    /// Route a 32-bit container into the low four bytes of a TCAM group.
    pub fn tcam_key_word(&mut self, group: u16, container: ContainerId) -> &mut Self {
        if container.width() != ContainerWidth::W32 {
            return self.record(Err(ConfigError::InvalidContainer { container: container.id() as u16 }));
        }
        for b in 0..4 {
            self.tcam_xbar(group * 5 + b, container, b as u8);
        }
        self
    }

    // TCAM

    pub fn tcam_row(&mut self, row: u16, col: u16, group: u8, halfbyte: Option<u8>) -> &mut Self {
        let ctl = TcamRowInput { group, halfbyte }.encode();
        self.reg("tcam_row_input_ctl", [row, col, 0], ctl as u128)
    }

    pub fn tcam_table(&mut self, row: u16, col: u16, logical_table: u8, priority: u8, chain: bool) -> &mut Self {
        let prop = TcamTableProp { enabled: true, logical_table, priority, chain }.encode();
        self.reg("tcam_table_prop", [row, col, 0], prop as u128)
    }

    pub fn tcam_entry(&mut self, row: u16, col: u16, index: u16, entry: TcamEntry) -> &mut Self {
        self.memory(block::TCAM, [row, col, index], entry.word0 as u128, entry.word1 as u128)
    }

    /// Route a logical table's TCAM hits to a tind RAM unit.
    pub fn tind_bus(&mut self, bus: u16, logical_table: u8, ram_row: u8, ram_col: u8) -> &mut Self {
        let prop = TindBus { bus: bus as u8, ram_row, ram_col }.encode(logical_table);
        self.reg("tind_bus_prop", [bus, 0, 0], prop as u128)
    }

    /// Store the overhead a TCAM match address selects from a tind unit.
    pub fn tind_overhead(&mut self, ram_row: u16, ram_col: u16, match_adr: u32, overhead: Overhead) -> &mut Self {
        let index = ((match_adr >> 1) & 0x3FF) as u16;
        let addr = RegAddress::encode(block::SRAM, ram_row, ram_col, index);
        let (w0, w1) = self.regs.read_memory(addr).unwrap_or((0, 0));
        let shift = if match_adr & 1 == 0 { 0 } else { 64 };
        let w0 = (w0 & !((u64::MAX as u128) << shift)) | ((overhead.raw() as u128) << shift);
        self.memory(block::SRAM, [ram_row, ram_col, index], w0, w1)
    }

    // Hash

    pub fn hash_matrix(&mut self, table: u16, bit: u16, column: u64) -> &mut Self {
        self.reg("galois_field_matrix", [table, bit, 0], column as u128)
    }

    /// Identity matrix: input bit `b` of `table` flips hash bit `b`.
    pub fn hash_identity(&mut self, table: u16) -> &mut Self {
        for bit in 0..52 {
            self.hash_matrix(table, bit, 1 << bit);
        }
        self
    }

    pub fn hash_group(&mut self, group: u16, tables: u16, seed: u64) -> &mut Self {
        self.reg("hash_group_ctl", [group, 0, 0], tables as u128).reg("hash_seed", [group, 0, 0], seed as u128)
    }

    pub fn parity_mask(&mut self, group: u16, mask: u64) -> &mut Self {
        self.reg("parity_group_mask", [group, 0, 0], mask as u128)
    }

    // Exact match

    pub fn exact_way(&mut self, way: &WayConfig) -> &mut Self {
        self.reg("exact_way_ctl", [way.way as u16, 0, 0], way.encode() as u128)
            .reg("exact_match_bytemask", [way.way as u16, 0, 0], way.bytemask as u128)
    }

    pub fn swizzle(&mut self, row: u16, bus: u16, swizzle: &Swizzle) -> &mut Self {
        for (i, &src) in swizzle.ctl().iter().enumerate() {
            self.reg("exactmatch_row_vh_xbar_byteswizzle_ctl", [row, bus, i as u16], src as u128);
        }
        self
    }

    pub fn exact_entry(&mut self, row: u16, col: u16, index: u16, entry: &ExactEntry) -> &mut Self {
        let (w0, w1) = entry.encode();
        self.memory(block::SRAM, [row, col, index], w0, w1)
    }

    // Address distribution

    fn resource_reg(&mut self, kind: ResourceKind, reg: u8, index: [u16; 3], value: u128) -> &mut Self {
        match kind.field(reg) {
            Some(spec) => self.reg(spec.name, index, value),
            None => self.record(Err(ConfigError::UnknownField(format!("{} register {}", kind, reg)))),
        }
    }

    /// Enable mux, default and miss value of one resource.
    pub fn resource(&mut self, kind: ResourceKind, logical_table: u8, mux: EnableMux, default: u32, miss: u32) -> &mut Self {
        let lt = [logical_table as u16, 0, 0];
        self.resource_reg(kind, resource_reg::PER_ENTRY_EN_MUX_CTL, lt, mux.encode() as u128)
            .resource_reg(kind, resource_reg::DEFAULT, lt, default as u128)
            .resource_reg(kind, resource_reg::MISS_VALUE, lt, miss as u128)
    }

    pub fn resource_shift(&mut self, kind: ResourceKind, logical_table: u8, tcam: u8, exact: u8) -> &mut Self {
        let lt = [logical_table as u16, 0, 0];
        self.resource_reg(kind, resource_reg::TCAM_SHIFTCOUNT, lt, tcam as u128)
            .resource_reg(kind, resource_reg::EXACT_SHIFTCOUNT, lt, exact as u128)
    }

    pub fn resource_mask(&mut self, kind: ResourceKind, logical_table: u8, mask: u32) -> &mut Self {
        self.resource_reg(kind, resource_reg::MASK, [logical_table as u16, 0, 0], mask as u128)
    }

    /// Action-bit map entry for a TCAM column; enables the map for the table.
    pub fn actionbit_map(&mut self, kind: ResourceKind, logical_table: u8, col: u16, data: u16) -> &mut Self {
        let en_name = kind.field(resource_reg::TCAM_ACTIONBIT_MAP_EN).map(|s| s.name).unwrap_or_default();
        let en = self.read(en_name, [0, 0, 0]) | (1 << logical_table);
        self.resource_reg(kind, resource_reg::TCAM_ACTIONBIT_MAP_EN, [0, 0, 0], en)
            .resource_reg(kind, resource_reg::TCAM_ACTIONBIT_MAP_DATA, [logical_table as u16, col, 0], data as u128)
    }

    pub fn next_table_map(&mut self, logical_table: u8, entries: [u8; NEXT_TABLE_MAP_ENTRIES]) -> &mut Self {
        let en = self.read("next_table_map_en", [0, 0, 0]) | (1 << logical_table);
        self.reg("next_table_map_en", [0, 0, 0], en);
        for (i, e) in entries.iter().enumerate() {
            self.reg("next_table_map_data", [logical_table as u16, i as u16, 0], *e as u128);
        }
        self
    }

    /// Report hits of TCAM `(row, col)` to address distribution under `prefix`.
    pub fn tcam_oxbar_outputmap(&mut self, row: u16, col: u16, prefix: u8) -> &mut Self {
        self.reg("tcam_match_adr_to_physical_oxbar_outputmap", [row, col, 0], 1 | ((prefix as u128) << 1))
    }

    /// Translate TCAM-hit next tables of `logical_table` with `target`'s map.
    pub fn tcam_ixbar_outputmap(&mut self, logical_table: u8, target: u8) -> &mut Self {
        self.reg("tcam_hit_to_logical_table_ixbar_outputmap", [logical_table as u16, 0, 0], 1 | ((target as u128) << 1))
    }

    pub fn thread(&mut self, logical_table: u8, direction: Direction) -> &mut Self {
        let mut thread = self.read("mau_logical_table_thread", [0, 0, 0]);
        match direction {
            Direction::Egress => thread |= 1 << logical_table,
            Direction::Ingress => thread &= !(1 << logical_table),
        }
        self.reg("mau_logical_table_thread", [0, 0, 0], thread)
    }

    pub fn lrt(&mut self, logical_table: u8, threshold: u32, interval: u32) -> &mut Self {
        let lt = [logical_table as u16, 0, 0];
        self.reg("lrt_threshold", lt, threshold as u128).reg("lrt_update_interval", lt, interval as u128)
    }

    // Actions

    /// Accumulate action-HV crossbar controls; written out by `build`.
    pub fn action_xbar(&mut self) -> &mut ActionHvXbarBuilder {
        &mut self.xbar
    }

    pub fn instruction(&mut self, dest: ContainerId, addr: u8, instr: Instruction) -> &mut Self {
        let name = match dest.width() {
            ContainerWidth::W8 => "imem_subword8",
            ContainerWidth::W16 => "imem_subword16",
            ContainerWidth::W32 => "imem_subword32",
        };
        self.reg(name, [dest.slot() as u16, addr as u16, 0], instr.encode() as u128)
    }

    /// Finish: flush the crossbar and return the register file.
    pub fn build(mut self) -> Result<RegisterFile, ConfigError> {
        for (name, index, value) in self.xbar.register_writes() {
            self.reg(name, index, value);
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.regs),
        }
    }

    /// Build and configure a stage.
    pub fn build_stage(self, errata: &[HardwareErratum]) -> Result<MauStage, ConfigError> {
        MauStage::configure(&self.build()?, errata)
    }
}
