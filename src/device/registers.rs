//! Stage register addresses and decoder.
//!
//! # Address Encoding
//!
//! Stage addresses select a register family (block) and up to three array
//! indices:
//! ```text
//! 64-bit address: [unused:16][block:8][i0:12][i1:12][i2:16]
//!
//!   BLOCK_SHIFT = 40
//!   I0_SHIFT    = 28
//!   I1_SHIFT    = 16
//! ```
//!
//! Memories (TCAM, SRAM) use the same encoding with `(row, col, entry)`
//! as indices.

use std::fmt;

use super::registers_spec::{
    self, block, FieldSpec, BLOCK_SHIFT, I0_MASK, I0_SHIFT, I1_MASK, I1_SHIFT, I2_MASK,
};
use crate::error::ConfigError;

/// Decoded stage register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegAddress {
    /// Register family
    pub block: u8,
    /// First array index
    pub i0: u16,
    /// Second array index
    pub i1: u16,
    /// Third array index
    pub i2: u16,
}

impl RegAddress {
    /// Create an address from its parts.
    pub fn new(block: u8, i0: u16, i1: u16, i2: u16) -> Self {
        Self { block, i0, i1, i2 }
    }

    /// Decode a raw 64-bit address.
    pub fn decode(addr: u64) -> Self {
        Self {
            block: ((addr >> BLOCK_SHIFT) & 0xFF) as u8,
            i0: ((addr >> I0_SHIFT) & I0_MASK) as u16,
            i1: ((addr >> I1_SHIFT) & I1_MASK) as u16,
            i2: (addr & I2_MASK) as u16,
        }
    }

    /// Encode parts into a raw 64-bit address.
    pub fn encode(block: u8, i0: u16, i1: u16, i2: u16) -> u64 {
        ((block as u64) << BLOCK_SHIFT)
            | (((i0 as u64) & I0_MASK) << I0_SHIFT)
            | (((i1 as u64) & I1_MASK) << I1_SHIFT)
            | ((i2 as u64) & I2_MASK)
    }

    /// Raw 64-bit form of this address.
    pub fn raw(&self) -> u64 {
        Self::encode(self.block, self.i0, self.i1, self.i2)
    }

    /// The register family at this address, if any.
    pub fn field(&self) -> Option<&'static FieldSpec> {
        registers_spec::field_by_block(self.block)
    }

    /// Which part of the stage the address belongs to.
    pub fn region(&self) -> RegisterRegion {
        RegisterRegion::from_block(self.block)
    }
}

impl fmt::Display for RegAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field() {
            Some(spec) => {
                write!(f, "{}", spec.name)?;
                if spec.dims[0] > 1 {
                    write!(f, "[{}]", self.i0)?;
                }
                if spec.dims[1] > 1 {
                    write!(f, "[{}]", self.i1)?;
                }
                if spec.dims[2] > 1 {
                    write!(f, "[{}]", self.i2)?;
                }
                Ok(())
            }
            None => write!(f, "block 0x{:02X} [{}][{}][{}]", self.block, self.i0, self.i1, self.i2),
        }
    }
}

/// Stage sub-block a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterRegion {
    /// Match input crossbar
    InputXbar,
    /// TCAM row/table properties
    TcamControl,
    /// Hash generation
    Hash,
    /// Exact-match ways and swizzles
    ExactMatch,
    /// Logical table control (next-table, thread, LRT)
    LogicalTable,
    /// Action-HV crossbar
    ActionXbar,
    /// Instruction memory
    InstructionMemory,
    /// Per-resource address distribution
    AddressMap,
    /// TCAM and SRAM memories
    Memory,
    /// Unknown block
    Unknown,
}

impl RegisterRegion {
    /// Determine the region from a block number.
    pub fn from_block(b: u8) -> Self {
        match b {
            block::MATCH_INPUT_XBAR_EXACT_CTL | block::MATCH_INPUT_XBAR_TCAM_CTL => Self::InputXbar,
            block::TCAM_ROW_INPUT_CTL | block::TCAM_TABLE_PROP | block::TIND_BUS_PROP => Self::TcamControl,
            block::GALOIS_FIELD_MATRIX..=block::PARITY_GROUP_MASK => Self::Hash,
            block::EXACT_WAY_CTL..=block::EXACTMATCH_BYTESWIZZLE_CTL => Self::ExactMatch,
            block::NEXT_TABLE_MAP_EN..=block::LRT_UPDATE_INTERVAL => Self::LogicalTable,
            block::ACTION_HV_XBAR_CTL_BYTE..=block::ACTION_HV_XBAR_CTL_WORD_ENABLE => Self::ActionXbar,
            block::IMEM_SUBWORD8..=block::IMEM_SUBWORD32 => Self::InstructionMemory,
            block::TCAM_MATCH_ADR_OXBAR_OUTPUTMAP | block::TCAM_HIT_IXBAR_OUTPUTMAP => Self::AddressMap,
            b if b >= block::RESOURCE_BASE && b < block::RESOURCE_BASE + 7 * block::RESOURCE_STRIDE => Self::AddressMap,
            block::TCAM | block::SRAM => Self::Memory,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RegisterRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterRegion::InputXbar => write!(f, "InXbar"),
            RegisterRegion::TcamControl => write!(f, "TcamCtl"),
            RegisterRegion::Hash => write!(f, "Hash"),
            RegisterRegion::ExactMatch => write!(f, "Exact"),
            RegisterRegion::LogicalTable => write!(f, "LogTbl"),
            RegisterRegion::ActionXbar => write!(f, "ActXbar"),
            RegisterRegion::InstructionMemory => write!(f, "Imem"),
            RegisterRegion::AddressMap => write!(f, "AdrMap"),
            RegisterRegion::Memory => write!(f, "Mem"),
            RegisterRegion::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A validated register location.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    /// Register family
    pub spec: &'static FieldSpec,
    /// Decoded address
    pub address: RegAddress,
}

impl RegisterInfo {
    /// Look up and bounds-check an address.
    pub fn lookup(addr: u64) -> Result<Self, ConfigError> {
        let address = RegAddress::decode(addr);
        let spec = address
            .field()
            .ok_or(ConfigError::UnknownRegister { address: addr })?;

        if !spec.contains(address.i0, address.i1, address.i2) {
            return Err(ConfigError::IndexOutOfRange {
                name: spec.name,
                i0: address.i0,
                i1: address.i1,
                i2: address.i2,
                dims: spec.dims,
            });
        }

        Ok(Self { spec, address })
    }

    /// Check a value against the field width.
    pub fn check_value(&self, value: u128) -> Result<(), ConfigError> {
        if value > self.spec.max_value() {
            return Err(ConfigError::ValueOutOfRange {
                name: self.spec.name,
                value,
                width: self.spec.width,
            });
        }
        Ok(())
    }

    /// Get a formatted description suitable for display.
    pub fn display(&self) -> String {
        format!("{} ({}, {} bits)", self.address, self.address.region(), self.spec.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let raw = RegAddress::encode(block::TCAM, 3, 1, 280);
        let addr = RegAddress::decode(raw);
        assert_eq!(addr, RegAddress::new(block::TCAM, 3, 1, 280));
        assert_eq!(addr.raw(), raw);
        assert_eq!(raw >> 40, 0xF0);
    }

    #[test]
    fn test_display() {
        let addr = RegAddress::new(block::TCAM, 0, 0, 280);
        assert_eq!(addr.to_string(), "tcam[0][0][280]");

        let addr = RegAddress::new(block::NEXT_TABLE_MAP_EN, 0, 0, 0);
        assert_eq!(addr.to_string(), "next_table_map_en");

        let addr = RegAddress::new(0xEE, 1, 2, 3);
        assert_eq!(addr.to_string(), "block 0xEE [1][2][3]");
    }

    #[test]
    fn test_region() {
        assert_eq!(RegisterRegion::from_block(block::HASH_SEED), RegisterRegion::Hash);
        assert_eq!(RegisterRegion::from_block(block::SRAM), RegisterRegion::Memory);
        assert_eq!(RegisterRegion::from_block(block::RESOURCE_BASE + 0x30), RegisterRegion::AddressMap);
        assert_eq!(RegisterRegion::from_block(0x90), RegisterRegion::Unknown);
    }

    #[test]
    fn test_lookup_bounds() {
        let raw = RegAddress::encode(block::TCAM_TABLE_PROP, 11, 1, 0);
        assert!(RegisterInfo::lookup(raw).is_ok());

        let raw = RegAddress::encode(block::TCAM_TABLE_PROP, 12, 0, 0);
        assert!(matches!(
            RegisterInfo::lookup(raw),
            Err(ConfigError::IndexOutOfRange { name: "tcam_table_prop", i0: 12, .. })
        ));

        let raw = RegAddress::encode(0x90, 0, 0, 0);
        assert!(matches!(RegisterInfo::lookup(raw), Err(ConfigError::UnknownRegister { .. })));
    }

    #[test]
    fn test_check_value() {
        let info = RegisterInfo::lookup(RegAddress::encode(block::HASH_GROUP_CTL, 0, 0, 0)).unwrap();
        assert!(info.check_value(0xFFFF).is_ok());
        assert!(info.check_value(0x1_0000).is_err());
    }
}
