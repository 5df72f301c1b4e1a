//! Match input crossbar.
//!
//! Gathers PHV bytes into the two match input buses:
//!
//! ```text
//!             match_input_xbar_exact_ctl[128]
//!   PHV ──┬──────────────────────────────────▶ exact bus: 8 groups x 16 bytes
//!         │                                    (hash table t = bytes 8t..8t+8)
//!         │   match_input_xbar_tcam_ctl[66]
//!         └──────────────────────────────────▶ tcam bus: 12 groups x 5 bytes
//!                                              + 6 midbytes (12 nibbles)
//! ```
//!
//! Each slot control is `enable[0] | byte[2:1] | container[10:3]`. A disabled
//! slot, or one whose container is invalid in the PHV, drives zero.

use byteorder::{ByteOrder, LittleEndian};

use crate::device::phv::{ContainerId, Phv};
use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{
    block, field_by_block, EXACT_GROUP_BYTES, EXACT_MATCH_GROUPS, EXACT_XBAR_BYTES, HASH_TABLES,
    TCAM_GROUP_BYTES, TCAM_GROUPS, TCAM_HALFBYTES, TCAM_MIDBYTE_BASE, TCAM_XBAR_BYTES,
};
use crate::error::ConfigError;

/// One programmed crossbar slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XbarSource {
    pub container: ContainerId,
    pub byte: u8,
}

impl XbarSource {
    /// Decode a slot control word. `None` when the slot is disabled.
    pub fn decode(slot: u16, ctl: u16) -> Result<Option<Self>, ConfigError> {
        if ctl & 1 == 0 {
            return Ok(None);
        }
        let byte = ((ctl >> 1) & 0x3) as u8;
        let container = (ctl >> 3) as u8;
        let id = ContainerId::new(container as u16)
            .filter(|id| (byte as usize) < id.width().bytes())
            .ok_or(ConfigError::InvalidXbarByte { slot, container, byte })?;
        Ok(Some(Self { container: id, byte }))
    }

    /// Encode back into the control word.
    pub fn encode(&self) -> u16 {
        1 | ((self.byte as u16) << 1) | ((self.container.id() as u16) << 3)
    }
}

/// Decoded input crossbar selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputXbarConfig {
    exact: Vec<Option<XbarSource>>,
    tcam: Vec<Option<XbarSource>>,
}

impl Default for InputXbarConfig {
    fn default() -> Self {
        Self { exact: vec![None; EXACT_XBAR_BYTES], tcam: vec![None; TCAM_XBAR_BYTES] }
    }
}

impl InputXbarConfig {
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        Ok(Self {
            exact: Self::decode_side(regs, block::MATCH_INPUT_XBAR_EXACT_CTL, EXACT_XBAR_BYTES)?,
            tcam: Self::decode_side(regs, block::MATCH_INPUT_XBAR_TCAM_CTL, TCAM_XBAR_BYTES)?,
        })
    }

    fn decode_side(regs: &RegisterFile, blk: u8, slots: usize) -> Result<Vec<Option<XbarSource>>, ConfigError> {
        let Some(spec) = field_by_block(blk) else {
            return Ok(vec![None; slots]);
        };
        (0..slots)
            .map(|slot| XbarSource::decode(slot as u16, regs.get(spec, slot, 0, 0) as u16))
            .collect()
    }

    /// Source of an exact-bus byte.
    pub fn exact_source(&self, slot: usize) -> Option<XbarSource> {
        self.exact.get(slot).copied().flatten()
    }

    /// Source of a TCAM-bus byte.
    pub fn tcam_source(&self, slot: usize) -> Option<XbarSource> {
        self.tcam.get(slot).copied().flatten()
    }

    /// Containers feeding any exact-bus byte of hash table `t`.
    pub fn hash_table_sources(&self, t: usize) -> impl Iterator<Item = XbarSource> + '_ {
        self.exact[8 * t..8 * t + 8].iter().filter_map(|s| *s)
    }
}

/// Bytes gathered from one PHV by the input crossbar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInput {
    exact: [u8; EXACT_XBAR_BYTES],
    exact_valid: [bool; EXACT_XBAR_BYTES],
    tcam: [u8; TCAM_XBAR_BYTES],
    tcam_valid: [bool; TCAM_XBAR_BYTES],
}

impl MatchInput {
    /// Run the crossbar over a PHV.
    pub fn gather(config: &InputXbarConfig, phv: &Phv) -> Self {
        let mut input = Self {
            exact: [0; EXACT_XBAR_BYTES],
            exact_valid: [false; EXACT_XBAR_BYTES],
            tcam: [0; TCAM_XBAR_BYTES],
            tcam_valid: [false; TCAM_XBAR_BYTES],
        };

        for (slot, src) in config.exact.iter().enumerate() {
            if let Some(byte) = src.and_then(|s| phv.byte(s.container, s.byte)) {
                input.exact[slot] = byte;
                input.exact_valid[slot] = true;
            }
        }
        for (slot, src) in config.tcam.iter().enumerate() {
            if let Some(byte) = src.and_then(|s| phv.byte(s.container, s.byte)) {
                input.tcam[slot] = byte;
                input.tcam_valid[slot] = true;
            }
        }
        input
    }

    /// Whole exact bus.
    pub fn exact_bytes(&self) -> &[u8; EXACT_XBAR_BYTES] {
        &self.exact
    }

    /// One 16-byte exact-match group.
    pub fn exact_group(&self, group: usize) -> [u8; EXACT_GROUP_BYTES] {
        debug_assert!(group < EXACT_MATCH_GROUPS);
        let mut out = [0u8; EXACT_GROUP_BYTES];
        out.copy_from_slice(&self.exact[group * EXACT_GROUP_BYTES..(group + 1) * EXACT_GROUP_BYTES]);
        out
    }

    /// Whether an exact-bus byte came from a valid container.
    pub fn exact_valid(&self, slot: usize) -> bool {
        self.exact_valid[slot]
    }

    /// 64 input bits of hash table `t` (byte 8t is bits 7:0).
    pub fn hash_table_bits(&self, t: usize) -> u64 {
        LittleEndian::read_u64(&self.exact[8 * t..8 * t + 8])
    }

    /// Input bits of all hash tables.
    pub fn hash_inputs(&self) -> [u64; HASH_TABLES] {
        let mut out = [0u64; HASH_TABLES];
        for (t, bits) in out.iter_mut().enumerate() {
            *bits = self.hash_table_bits(t);
        }
        out
    }

    /// Five key bytes of a TCAM group.
    pub fn tcam_group(&self, group: usize) -> [u8; TCAM_GROUP_BYTES] {
        debug_assert!(group < TCAM_GROUPS);
        let mut out = [0u8; TCAM_GROUP_BYTES];
        out.copy_from_slice(&self.tcam[group * TCAM_GROUP_BYTES..(group + 1) * TCAM_GROUP_BYTES]);
        out
    }

    /// Half-byte `n` of the midbytes (even = low nibble).
    pub fn tcam_nibble(&self, n: usize) -> u8 {
        debug_assert!(n < TCAM_HALFBYTES);
        let byte = self.tcam[TCAM_MIDBYTE_BASE + n / 2];
        if n % 2 == 0 {
            byte & 0xF
        } else {
            byte >> 4
        }
    }

    /// Whether a TCAM-bus byte came from a valid container.
    pub fn tcam_valid(&self, slot: usize) -> bool {
        self.tcam_valid[slot]
    }
}
