//! Match-action stage model.
//!
//! This module provides:
//! - Match input crossbar and TCAM / hash / exact-match engines
//! - Address distribution of match results to stage resources
//! - Action-HV crossbar and per-container action ALUs
//! - Stats, meter and idletime wrappers with LRT eviction
//! - Named hardware errata
//!
//! # Example
//!
//! ```
//! use mau_emu::device::{Phv, RegisterFile};
//! use mau_emu::mau::MauStage;
//!
//! let regs = RegisterFile::new();
//! let mut stage = MauStage::configure(&regs, &[]).unwrap();
//! let out = stage.process(&Phv::ingress());
//! assert!(out.tables.is_empty());
//! ```

pub mod action;
pub mod action_xbar;
pub mod address_dist;
pub mod errata;
pub mod exact;
pub mod hash;
pub mod input_xbar;
pub mod sram;
pub mod stage;
pub mod stats;
pub mod tcam;

use smallvec::SmallVec;

use crate::device::phv::Phv;
use crate::device::register_file::RegisterFile;
use crate::error::{ConfigError, UndefinedSource};

pub use action::{AluOp, Instruction, OperandSource};
pub use action_xbar::{ActionHvXbarBuilder, ActionHvXbarConfig, LaneGranularity, LaneId};
pub use address_dist::{EnableMux, MatchOutcome, Overhead, ResourceAddresses, ResourceKind};
pub use errata::HardwareErratum;
pub use exact::{Swizzle, WayConfig};
pub use hash::HashValue;
pub use stage::StageConfig;
pub use stats::{Eviction, StatsWrapper};
pub use tcam::{TcamEntry, TcamHit};

/// Result of one logical table for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableResult {
    pub logical_table: u8,
    pub outcome: MatchOutcome,
    pub addresses: ResourceAddresses,
}

impl TableResult {
    pub fn next_table(&self) -> u8 {
        self.addresses.get(ResourceKind::NextTable) as u8
    }
}

/// Everything a stage produced for one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub phv: Phv,
    pub tables: SmallVec<[TableResult; 4]>,
    /// Operands that read invalid data; their destinations are invalid
    pub undefined: Vec<UndefinedSource>,
}

impl StageOutput {
    pub fn table(&self, logical_table: u8) -> Option<&TableResult> {
        self.tables.iter().find(|t| t.logical_table == logical_table)
    }
}

/// A configured stage plus its accumulated resource state.
#[derive(Debug, Clone)]
pub struct MauStage {
    config: StageConfig,
    stats: StatsWrapper,
    cycle: u64,
}

impl MauStage {
    /// Build a stage from programmed registers.
    pub fn configure(regs: &RegisterFile, errata: &[HardwareErratum]) -> Result<Self, ConfigError> {
        Ok(Self::from_config(StageConfig::load(regs, errata)?))
    }

    pub fn from_config(config: StageConfig) -> Self {
        Self { config, stats: StatsWrapper::new(), cycle: 0 }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsWrapper {
        &self.stats
    }

    /// Packets processed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Process one packet and update resource state.
    pub fn process(&mut self, phv: &Phv) -> StageOutput {
        let out = self.config.evaluate(phv);
        self.stats.record(self.cycle, &out.tables, &self.config.lrt);
        self.cycle += 1;
        out
    }
}
