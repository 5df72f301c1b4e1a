//! Action-HV crossbar.
//!
//! Places PHV containers onto the 256-byte action bus read by the ALUs.
//! Every row of 32 bus bytes is covered three ways:
//!
//! ```text
//! byte lanes: 32 x 1 byte   ctl = container << 2 | byte
//! half lanes: 16 x 2 bytes  ctl = container << 1 | half
//! word lanes:  8 x 4 bytes  ctl = container
//! ```
//!
//! A lane drives the bus only when its bit in the matching `_enable`
//! register is set. Controls are accumulated in an [`ActionHvXbarBuilder`]
//! and checked as a whole on [`ActionHvXbarBuilder::commit`].

use std::collections::BTreeMap;
use std::fmt;

use crate::device::phv::{ContainerId, ContainerWidth, Phv};
use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{
    block, field_by_block, ACTION_BUS_BYTES, ACTION_BYTE_LANES, ACTION_HALF_LANES, ACTION_ROWS, ACTION_ROW_BYTES,
    ACTION_WORD_LANES,
};
use crate::error::ConfigError;

/// Lane size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaneGranularity {
    Byte,
    Half,
    Word,
}

impl LaneGranularity {
    pub const ALL: [LaneGranularity; 3] = [LaneGranularity::Byte, LaneGranularity::Half, LaneGranularity::Word];

    /// Bus bytes covered by one lane.
    pub fn bytes(self) -> usize {
        match self {
            LaneGranularity::Byte => 1,
            LaneGranularity::Half => 2,
            LaneGranularity::Word => 4,
        }
    }

    pub fn lanes_per_row(self) -> usize {
        match self {
            LaneGranularity::Byte => ACTION_BYTE_LANES,
            LaneGranularity::Half => ACTION_HALF_LANES,
            LaneGranularity::Word => ACTION_WORD_LANES,
        }
    }

    fn ctl_block(self) -> u8 {
        match self {
            LaneGranularity::Byte => block::ACTION_HV_XBAR_CTL_BYTE,
            LaneGranularity::Half => block::ACTION_HV_XBAR_CTL_HALF,
            LaneGranularity::Word => block::ACTION_HV_XBAR_CTL_WORD,
        }
    }

    fn enable_block(self) -> u8 {
        match self {
            LaneGranularity::Byte => block::ACTION_HV_XBAR_CTL_BYTE_ENABLE,
            LaneGranularity::Half => block::ACTION_HV_XBAR_CTL_HALF_ENABLE,
            LaneGranularity::Word => block::ACTION_HV_XBAR_CTL_WORD_ENABLE,
        }
    }
}

impl fmt::Display for LaneGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneGranularity::Byte => write!(f, "byte"),
            LaneGranularity::Half => write!(f, "half"),
            LaneGranularity::Word => write!(f, "word"),
        }
    }
}

/// One crossbar lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId {
    pub row: u8,
    pub granularity: LaneGranularity,
    pub lane: u8,
}

impl LaneId {
    /// First action bus byte driven by the lane.
    pub fn bus_offset(&self) -> usize {
        self.row as usize * ACTION_ROW_BYTES + self.lane as usize * self.granularity.bytes()
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row{}.{}{}", self.row, self.granularity, self.lane)
    }
}

/// Where a lane takes its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSource {
    pub container: ContainerId,
    /// Byte (byte lanes) or half (half lanes) within the container
    pub part: u8,
}

/// Accumulates crossbar controls before they are checked and committed.
#[derive(Debug, Clone, Default)]
pub struct ActionHvXbarBuilder {
    ctl: BTreeMap<LaneId, u16>,
    enables: BTreeMap<(u8, LaneGranularity), u32>,
}

impl ActionHvXbarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every programmed control and enable from a register file.
    pub fn from_registers(regs: &RegisterFile) -> Self {
        let mut builder = Self::new();
        for g in LaneGranularity::ALL {
            let (Some(ctl), Some(en)) = (field_by_block(g.ctl_block()), field_by_block(g.enable_block())) else {
                continue;
            };
            for row in 0..ACTION_ROWS {
                for lane in 0..g.lanes_per_row() {
                    if regs.was_written(ctl, row, lane, 0) {
                        let id = LaneId { row: row as u8, granularity: g, lane: lane as u8 };
                        builder.ctl.insert(id, regs.get(ctl, row, lane, 0) as u16);
                    }
                }
                let mask = regs.get_u32(en, row, 0, 0);
                if mask != 0 {
                    builder.enables.insert((row as u8, g), mask);
                }
            }
        }
        builder
    }

    pub fn ctl_byte(&mut self, row: u8, lane: u8, container: u8, byte: u8) -> &mut Self {
        let id = LaneId { row, granularity: LaneGranularity::Byte, lane };
        self.ctl.insert(id, ((container as u16) << 2) | (byte as u16 & 0x3));
        self
    }

    pub fn ctl_half(&mut self, row: u8, lane: u8, container: u8, half: u8) -> &mut Self {
        let id = LaneId { row, granularity: LaneGranularity::Half, lane };
        self.ctl.insert(id, ((container as u16) << 1) | (half as u16 & 0x1));
        self
    }

    pub fn ctl_word(&mut self, row: u8, lane: u8, container: u8) -> &mut Self {
        let id = LaneId { row, granularity: LaneGranularity::Word, lane };
        self.ctl.insert(id, container as u16);
        self
    }

    pub fn byte_enable(&mut self, row: u8, mask: u32) -> &mut Self {
        self.enables.insert((row, LaneGranularity::Byte), mask);
        self
    }

    pub fn half_enable(&mut self, row: u8, mask: u16) -> &mut Self {
        self.enables.insert((row, LaneGranularity::Half), mask as u32);
        self
    }

    pub fn word_enable(&mut self, row: u8, mask: u8) -> &mut Self {
        self.enables.insert((row, LaneGranularity::Word), mask as u32);
        self
    }

    /// Register writes equivalent to the accumulated controls.
    pub fn register_writes(&self) -> Vec<(&'static str, [u16; 3], u128)> {
        let mut writes = Vec::new();
        for (id, value) in &self.ctl {
            let name = match id.granularity {
                LaneGranularity::Byte => "action_hv_xbar_ctl_byte",
                LaneGranularity::Half => "action_hv_xbar_ctl_half",
                LaneGranularity::Word => "action_hv_xbar_ctl_word",
            };
            writes.push((name, [id.row as u16, id.lane as u16, 0], *value as u128));
        }
        for ((row, g), mask) in &self.enables {
            let name = match g {
                LaneGranularity::Byte => "action_hv_xbar_ctl_byte_enable",
                LaneGranularity::Half => "action_hv_xbar_ctl_half_enable",
                LaneGranularity::Word => "action_hv_xbar_ctl_word_enable",
            };
            writes.push((name, [*row as u16, 0, 0], *mask as u128));
        }
        writes
    }

    fn source(id: LaneId, ctl: u16) -> Result<LaneSource, ConfigError> {
        let (container, part) = match id.granularity {
            LaneGranularity::Byte => (ctl >> 2, (ctl & 0x3) as u8),
            LaneGranularity::Half => (ctl >> 1, (ctl & 0x1) as u8),
            LaneGranularity::Word => (ctl, 0),
        };
        let cid = ContainerId::new(container).ok_or(ConfigError::InvalidContainer { container })?;
        let fits = match id.granularity {
            LaneGranularity::Byte => (part as usize) < cid.width().bytes(),
            LaneGranularity::Half => (part as usize + 1) * 2 <= cid.width().bytes(),
            LaneGranularity::Word => cid.width() == ContainerWidth::W32,
        };
        if !fits {
            return Err(ConfigError::LaneWidthMismatch { lane: id, container: cid.id() });
        }
        Ok(LaneSource { container: cid, part })
    }

    /// Check the accumulated controls and freeze them.
    pub fn commit(&self) -> Result<ActionHvXbarConfig, ConfigError> {
        let mut config = ActionHvXbarConfig::default();

        for (&(row, g), &mask) in &self.enables {
            for lane in 0..g.lanes_per_row() {
                if mask & (1 << lane) == 0 {
                    continue;
                }
                let id = LaneId { row, granularity: g, lane: lane as u8 };
                let ctl = *self.ctl.get(&id).ok_or(ConfigError::LaneWithoutSource { lane: id })?;
                let source = Self::source(id, ctl)?;

                for b in id.bus_offset()..id.bus_offset() + g.bytes() {
                    if let Some(first) = config.owner[b] {
                        return Err(ConfigError::LaneConflict {
                            row,
                            byte: (b % ACTION_ROW_BYTES) as u8,
                            first,
                            second: id,
                        });
                    }
                    config.owner[b] = Some(id);
                }
                config.lanes.push((id, source));
            }
        }
        Ok(config)
    }
}

/// Committed crossbar: enabled lanes and their sources.
#[derive(Debug, Clone)]
pub struct ActionHvXbarConfig {
    lanes: Vec<(LaneId, LaneSource)>,
    owner: Vec<Option<LaneId>>,
}

impl Default for ActionHvXbarConfig {
    fn default() -> Self {
        Self { lanes: Vec::new(), owner: vec![None; ACTION_BUS_BYTES] }
    }
}

impl ActionHvXbarConfig {
    pub fn lanes(&self) -> &[(LaneId, LaneSource)] {
        &self.lanes
    }

    /// Lane driving a bus byte.
    pub fn owner(&self, offset: usize) -> Option<LaneId> {
        self.owner.get(offset).copied().flatten()
    }

    /// Build the action bus for a PHV.
    pub fn assemble(&self, phv: &Phv) -> ActionBus {
        let mut bus = ActionBus::default();
        for (id, src) in &self.lanes {
            let first_byte = match id.granularity {
                LaneGranularity::Byte => src.part,
                LaneGranularity::Half => src.part * 2,
                LaneGranularity::Word => 0,
            };
            for i in 0..id.granularity.bytes() {
                if let Some(byte) = phv.byte(src.container, first_byte + i as u8) {
                    bus.bytes[id.bus_offset() + i] = byte;
                    bus.valid[id.bus_offset() + i] = true;
                }
            }
        }
        bus
    }
}

/// Action bus contents with per-byte validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBus {
    bytes: [u8; ACTION_BUS_BYTES],
    valid: [bool; ACTION_BUS_BYTES],
}

impl Default for ActionBus {
    fn default() -> Self {
        Self { bytes: [0; ACTION_BUS_BYTES], valid: [false; ACTION_BUS_BYTES] }
    }
}

impl ActionBus {
    pub fn byte(&self, offset: usize) -> Option<u8> {
        (offset < ACTION_BUS_BYTES && self.valid[offset]).then(|| self.bytes[offset])
    }

    /// Little-endian read of `len` bytes, `None` if any is invalid.
    pub fn read(&self, offset: usize, len: usize) -> Option<u32> {
        (0..len).try_fold(0u32, |acc, i| self.byte(offset + i).map(|b| acc | ((b as u32) << (8 * i))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_display() {
        let lane = LaneId { row: 2, granularity: LaneGranularity::Half, lane: 3 };
        assert_eq!(lane.to_string(), "row2.half3");
        assert_eq!(lane.bus_offset(), 2 * 32 + 6);
    }

    #[test]
    fn test_commit_and_assemble() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_word(0, 0, 3).ctl_half(0, 2, 128, 0).ctl_byte(0, 6, 64, 0);
        b.word_enable(0, 0x1).half_enable(0, 1 << 2).byte_enable(0, 1 << 6);
        let config = b.commit().unwrap();
        assert_eq!(config.lanes().len(), 3);

        let mut phv = Phv::ingress();
        phv.set_id(3, 0x4433_2211).unwrap();
        phv.set_id(128, 0xBBAA).unwrap();
        let bus = config.assemble(&phv);
        assert_eq!(bus.read(0, 4), Some(0x4433_2211));
        assert_eq!(bus.read(4, 2), Some(0xBBAA));
        // B0 never written
        assert_eq!(bus.byte(6), None);
        assert_eq!(bus.read(5, 2), None);
    }

    #[test]
    fn test_lane_without_source() {
        let mut b = ActionHvXbarBuilder::new();
        b.half_enable(2, 1 << 3);
        assert_eq!(
            b.commit().unwrap_err(),
            ConfigError::LaneWithoutSource { lane: LaneId { row: 2, granularity: LaneGranularity::Half, lane: 3 } }
        );
    }

    #[test]
    fn test_source_without_enable_is_ignored() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_word(1, 1, 200);
        assert!(b.commit().unwrap().lanes().is_empty());
    }

    #[test]
    fn test_width_mismatch() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_word(0, 0, 64).word_enable(0, 1);
        assert!(matches!(b.commit(), Err(ConfigError::LaneWidthMismatch { container: 64, .. })));

        let mut b = ActionHvXbarBuilder::new();
        b.ctl_half(0, 0, 130, 1).half_enable(0, 1);
        assert!(matches!(b.commit(), Err(ConfigError::LaneWidthMismatch { container: 130, .. })));
    }

    #[test]
    fn test_invalid_container() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_word(0, 0, 250).word_enable(0, 1);
        assert_eq!(b.commit().unwrap_err(), ConfigError::InvalidContainer { container: 250 });
    }

    #[test]
    fn test_lane_conflict() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_byte(1, 1, 0, 0).ctl_word(1, 0, 0);
        b.byte_enable(1, 1 << 1).word_enable(1, 1);
        let err = b.commit().unwrap_err();
        assert!(matches!(err, ConfigError::LaneConflict { row: 1, byte: 1, .. }));
    }

    #[test]
    fn test_from_registers_matches_builder() {
        let mut b = ActionHvXbarBuilder::new();
        b.ctl_half(3, 4, 129, 0).half_enable(3, 1 << 4);
        let mut regs = RegisterFile::new();
        for (name, index, value) in b.register_writes() {
            regs.write_field(name, index, value).unwrap();
        }
        let from_regs = ActionHvXbarBuilder::from_registers(&regs).commit().unwrap();
        assert_eq!(from_regs.lanes(), b.commit().unwrap().lanes());
        assert_eq!(from_regs.owner(3 * 32 + 8), Some(LaneId { row: 3, granularity: LaneGranularity::Half, lane: 4 }));
    }
}
