//! Stage state and register-stream application.
//!
//! This module connects the parsers (register blob, text script) to the
//! register file. It applies write commands to build up the configuration
//! that a [`MauStage`] is then built from.
//!
//! # Load Process
//!
//! 1. Create a `StageState` with an empty `RegisterFile`
//! 2. Call `apply_blob()` or `apply_commands()` to process the writes
//! 3. Call `build_stage()` to decode, apply errata and validate
//!
//! The first rejected write aborts the load.
//!
//! # Example
//!
//! ```
//! use mau_emu::device::StageState;
//! use mau_emu::parser::regblob::{RegBlob, RegBlobWriter};
//!
//! let mut w = RegBlobWriter::new();
//! w.write(0x1300_0000_0000, 100).end();
//! let bytes = w.finish();
//!
//! let mut state = StageState::new();
//! state.apply_blob(&RegBlob::parse(&bytes)?)?;
//! assert_eq!(state.stats.writes, 1);
//! let stage = state.build_stage(&[])?;
//! assert_eq!(stage.config().lrt[0].threshold, 100);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::BTreeMap;

use super::register_file::RegisterFile;
use super::registers::{RegAddress, RegisterRegion};
use super::registers_spec::block;
use crate::error::ConfigError;
use crate::mau::{HardwareErratum, MauStage};
use crate::parser::regblob::{RegBlob, RegCommand};

/// Statistics about register-stream application.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    /// Total commands processed
    pub commands: usize,
    /// Direct register writes
    pub writes: usize,
    /// TCAM/SRAM indirect writes
    pub indirect_writes: usize,
    /// NOP commands (skipped)
    pub nops: usize,
}

/// Register file plus load bookkeeping for one stage.
#[derive(Debug, Default, Clone)]
pub struct StageState {
    /// The stage registers and memories
    pub regs: RegisterFile,
    /// Statistics from the last application
    pub stats: LoadStats,
}

impl StageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-programmed register file.
    pub fn from_registers(regs: RegisterFile) -> Self {
        Self { regs, stats: LoadStats::default() }
    }

    /// Apply every command of a register blob.
    pub fn apply_blob(&mut self, blob: &RegBlob) -> Result<(), ConfigError> {
        self.stats = LoadStats::default();
        self.apply_commands(blob.commands())
    }

    /// Apply commands until `End` or the first rejected write.
    pub fn apply_commands<I>(&mut self, commands: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = RegCommand>,
    {
        for cmd in commands {
            if cmd == RegCommand::End {
                break;
            }
            self.apply_command(&cmd)?;
        }
        Ok(())
    }

    /// Apply a single command.
    pub fn apply_command(&mut self, cmd: &RegCommand) -> Result<(), ConfigError> {
        self.stats.commands += 1;
        match cmd {
            RegCommand::Nop { .. } => {
                self.stats.nops += 1;
            }

            RegCommand::Write { address, value } => {
                self.stats.writes += 1;
                self.regs.write_register(*address, *value)?;
            }

            RegCommand::Indirect { address, word0, word1 } => {
                self.stats.indirect_writes += 1;
                log::trace!("indirect {} ({})", RegAddress::decode(*address), RegAddress::decode(*address).region());
                self.regs.indirect_write(*address, *word0, *word1)?;
            }

            RegCommand::End => {}

            RegCommand::Unknown { opcode, .. } => {
                return Err(ConfigError::UnknownCommand { opcode: *opcode });
            }

            RegCommand::Malformed { opcode, expected, found } => {
                return Err(ConfigError::MalformedCommand { opcode: *opcode, expected: *expected, found: *found });
            }
        }
        Ok(())
    }

    /// Decode the registers into a runnable stage.
    pub fn build_stage(&self, errata: &[HardwareErratum]) -> Result<MauStage, ConfigError> {
        MauStage::configure(&self.regs, errata)
    }

    /// Written registers per sub-block.
    pub fn region_counts(&self) -> BTreeMap<RegisterRegion, usize> {
        let mut counts = BTreeMap::new();
        for (addr, _) in self.regs.registers() {
            *counts.entry(addr.region()).or_insert(0) += 1;
        }
        counts
    }

    /// Print a summary of the stage state.
    pub fn print_summary(&self) {
        println!("Stage State Summary");
        println!("===================");
        println!("Load Stats:");
        println!("  Commands: {}", self.stats.commands);
        println!("  Writes: {}", self.stats.writes);
        println!("  Indirect writes: {}", self.stats.indirect_writes);
        println!("  NOPs: {}", self.stats.nops);

        println!();
        println!("Programmed Regions:");
        for (region, count) in self.region_counts() {
            println!("  {:<8} {} registers", region.to_string(), count);
        }
        println!("  {:<8} {} memory words", RegisterRegion::Memory.to_string(), self.memory_words());
    }

    fn memory_words(&self) -> usize {
        self.regs.memory_words(block::TCAM).count() + self.regs.memory_words(block::SRAM).count()
    }
}
