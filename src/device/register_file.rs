//! Per-stage register file.
//!
//! Sparse, ordered storage for every configuration register and the TCAM and
//! SRAM memories of one stage. Writes are checked against the address map;
//! reads of never-written registers return the field's reset value.

use std::collections::BTreeMap;

use super::registers::{RegAddress, RegisterInfo};
use super::registers_spec::{self, FieldSpec};
use crate::error::ConfigError;

/// Register and memory storage for one stage.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    /// Direct registers: raw address -> value
    regs: BTreeMap<u64, u128>,
    /// Memory words: raw address -> (word0, word1)
    mems: BTreeMap<u64, (u128, u128)>,
}

impl RegisterFile {
    /// Create an empty register file (all registers at reset).
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a direct register.
    pub fn write_register(&mut self, address: u64, value: u128) -> Result<(), ConfigError> {
        let info = RegisterInfo::lookup(address)?;
        if info.spec.memory {
            return Err(ConfigError::NotARegister { name: info.spec.name });
        }
        info.check_value(value)?;

        log::trace!("write {} = 0x{:X}", info.address, value);
        self.regs.insert(info.address.raw(), value);
        Ok(())
    }

    /// Write a two-word memory entry (TCAM or SRAM).
    pub fn indirect_write(&mut self, address: u64, word0: u128, word1: u128) -> Result<(), ConfigError> {
        let info = RegisterInfo::lookup(address)?;
        if !info.spec.memory {
            return Err(ConfigError::NotAMemory { name: info.spec.name });
        }
        info.check_value(word0)?;
        info.check_value(word1)?;

        log::trace!("indirect {} = (0x{:X}, 0x{:X})", info.address, word0, word1);
        self.mems.insert(info.address.raw(), (word0, word1));
        Ok(())
    }

    /// Read back a direct register (reset value if never written).
    pub fn read(&self, address: u64) -> Result<u128, ConfigError> {
        let info = RegisterInfo::lookup(address)?;
        if info.spec.memory {
            return Err(ConfigError::NotARegister { name: info.spec.name });
        }
        Ok(self.regs.get(&info.address.raw()).copied().unwrap_or(info.spec.reset))
    }

    /// Read back a memory entry (zero if never written).
    pub fn read_memory(&self, address: u64) -> Result<(u128, u128), ConfigError> {
        let info = RegisterInfo::lookup(address)?;
        if !info.spec.memory {
            return Err(ConfigError::NotAMemory { name: info.spec.name });
        }
        Ok(self.mems.get(&info.address.raw()).copied().unwrap_or((0, 0)))
    }

    /// Check whether a register or memory word has been written.
    pub fn is_written(&self, address: u64) -> bool {
        let raw = RegAddress::decode(address).raw();
        self.regs.contains_key(&raw) || self.mems.contains_key(&raw)
    }

    /// Typed accessor: value of `spec[i0][i1][i2]`.
    ///
    /// Callers pass indices already known to be in range.
    pub fn get(&self, spec: &FieldSpec, i0: usize, i1: usize, i2: usize) -> u128 {
        debug_assert!(spec.contains(i0 as u16, i1 as u16, i2 as u16), "{} index out of range", spec.name);
        let raw = RegAddress::encode(spec.block, i0 as u16, i1 as u16, i2 as u16);
        self.regs.get(&raw).copied().unwrap_or(spec.reset)
    }

    /// Typed accessor truncated to 64 bits.
    #[inline]
    pub fn get_u64(&self, spec: &FieldSpec, i0: usize, i1: usize, i2: usize) -> u64 {
        self.get(spec, i0, i1, i2) as u64
    }

    /// Typed accessor truncated to 32 bits.
    #[inline]
    pub fn get_u32(&self, spec: &FieldSpec, i0: usize, i1: usize, i2: usize) -> u32 {
        self.get(spec, i0, i1, i2) as u32
    }

    /// Whether `spec[i0][i1][i2]` has been written.
    pub fn was_written(&self, spec: &FieldSpec, i0: usize, i1: usize, i2: usize) -> bool {
        let raw = RegAddress::encode(spec.block, i0 as u16, i1 as u16, i2 as u16);
        self.regs.contains_key(&raw)
    }

    /// Write a register by name.
    pub fn write_field(&mut self, name: &str, index: [u16; 3], value: u128) -> Result<(), ConfigError> {
        let spec = registers_spec::field_by_name(name).ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        self.write_register(RegAddress::encode(spec.block, index[0], index[1], index[2]), value)
    }

    /// Read a register by name.
    pub fn read_field(&self, name: &str, index: [u16; 3]) -> Result<u128, ConfigError> {
        let spec = registers_spec::field_by_name(name).ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        self.read(RegAddress::encode(spec.block, index[0], index[1], index[2]))
    }

    /// Iterate over written direct registers in address order.
    pub fn registers(&self) -> impl Iterator<Item = (RegAddress, u128)> + '_ {
        self.regs.iter().map(|(&raw, &v)| (RegAddress::decode(raw), v))
    }

    /// Iterate over written words of one memory block in address order.
    pub fn memory_words(&self, block: u8) -> impl Iterator<Item = (RegAddress, (u128, u128))> + '_ {
        let start = RegAddress::encode(block, 0, 0, 0);
        let end = start + (1u64 << registers_spec::BLOCK_SHIFT);
        self.mems.range(start..end).map(|(&raw, &w)| (RegAddress::decode(raw), w))
    }

    /// Number of written registers and memory words.
    pub fn len(&self) -> usize {
        self.regs.len() + self.mems.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty() && self.mems.is_empty()
    }

    /// Print all written registers.
    pub fn print_dump(&self) {
        println!("Registers ({} written)", self.regs.len());
        for (addr, value) in self.registers() {
            println!("  {:<48} 0x{:X}", addr.to_string(), value);
        }
        println!("Memory words ({} written)", self.mems.len());
        for (raw, (w0, w1)) in &self.mems {
            println!("  {:<48} 0x{:X} 0x{:X}", RegAddress::decode(*raw).to_string(), w0, w1);
        }
    }
}
