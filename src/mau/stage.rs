//! Typed stage configuration.
//!
//! Decodes a [`RegisterFile`] into one configuration record per sub-block,
//! applies the selected errata, validates the result, and evaluates PHVs
//! against it.
//!
//! # Per-packet Flow
//!
//! ```text
//! PHV ─▶ input xbar ─▶ TCAM lookup ──┐
//!                   └▶ hash ─▶ exact ┴▶ address distribution ─▶ ALUs ─▶ PHV'
//!     ─▶ action-HV xbar ─▶ action bus ──────────────────────────┘
//! ```

use smallvec::SmallVec;

use crate::device::phv::{Direction, Phv};
use crate::device::register_file::RegisterFile;
use crate::device::registers_spec::{block, field_by_block, LOGICAL_TABLES};
use crate::error::ConfigError;
use crate::mau::action::{merge_writes, ActionEngine, InstructionMemory};
use crate::mau::action_xbar::{ActionHvXbarBuilder, ActionHvXbarConfig};
use crate::mau::address_dist::{AddressMapConfig, MatchOutcome, ResourceKind};
use crate::mau::errata::HardwareErratum;
use crate::mau::exact::ExactConfig;
use crate::mau::hash::HashConfig;
use crate::mau::input_xbar::{InputXbarConfig, MatchInput};
use crate::mau::sram::SramArray;
use crate::mau::stats::LrtConfig;
use crate::mau::tcam::TcamArray;
use crate::mau::{StageOutput, TableResult};

/// Decoded configuration of one stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub input_xbar: InputXbarConfig,
    pub tcam: TcamArray,
    pub hash: HashConfig,
    pub exact: ExactConfig,
    pub sram: SramArray,
    pub address_map: AddressMapConfig,
    pub action_xbar: ActionHvXbarConfig,
    pub imem: InstructionMemory,
    /// Bit per logical table: set = egress
    pub thread: u16,
    pub lrt: [LrtConfig; LOGICAL_TABLES],
    pub errata: Vec<HardwareErratum>,
}

impl StageConfig {
    /// Decode every sub-block without cross-checks.
    pub fn decode(regs: &RegisterFile) -> Result<Self, ConfigError> {
        let thread = field_by_block(block::LOGICAL_TABLE_THREAD).map(|spec| regs.get(spec, 0, 0, 0) as u16).unwrap_or(0);

        Ok(Self {
            input_xbar: InputXbarConfig::decode(regs)?,
            tcam: TcamArray::decode(regs)?,
            hash: HashConfig::decode(regs)?,
            exact: ExactConfig::decode(regs)?,
            sram: SramArray::decode(regs),
            address_map: AddressMapConfig::decode(regs)?,
            action_xbar: ActionHvXbarBuilder::from_registers(regs).commit()?,
            imem: InstructionMemory::decode(regs)?,
            thread,
            lrt: LrtConfig::decode_all(regs),
            errata: Vec::new(),
        })
    }

    /// Cross-check the decoded sub-blocks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tcam.validate()?;
        self.exact.validate()?;
        self.address_map.validate()
    }

    /// Decode, apply errata in order, then validate.
    pub fn load(regs: &RegisterFile, errata: &[HardwareErratum]) -> Result<Self, ConfigError> {
        let mut config = Self::decode(regs)?;
        for erratum in errata {
            erratum.apply(&mut config);
            config.errata.push(*erratum);
        }
        config.validate()?;

        log::debug!(
            "stage loaded: {} tcam entries, {} sram words, {} ways, {} instructions",
            config.tcam.entries_len(),
            config.sram.len(),
            config.exact.ways().len(),
            config.imem.len()
        );
        Ok(config)
    }

    pub fn logical_tables(&self) -> u8 {
        LOGICAL_TABLES as u8
    }

    pub fn direction(&self, logical_table: u8) -> Direction {
        if self.thread & (1 << logical_table) != 0 {
            Direction::Egress
        } else {
            Direction::Ingress
        }
    }

    /// Logical tables with a match resource, for a PHV direction.
    pub fn active_tables(&self, direction: Direction) -> impl Iterator<Item = u8> + '_ {
        (0..self.logical_tables()).filter(move |&lt| {
            self.direction(lt) == direction && (self.tcam.serves(lt) || self.exact.serves(lt))
        })
    }

    /// Match a logical table: TCAM first, then exact.
    pub fn lookup(&self, logical_table: u8, input: &MatchInput) -> MatchOutcome {
        if let Some(hit) = self.tcam.lookup(logical_table, input) {
            let overhead = self.address_map.tind_overhead(logical_table, &hit, &self.sram);
            return MatchOutcome::Tcam { hit, overhead };
        }
        match self.exact.lookup(logical_table, input, &self.hash, &self.sram) {
            Some((hit, _)) => MatchOutcome::Exact { hit },
            None => MatchOutcome::Miss,
        }
    }

    /// Process one PHV. Pure: the configuration is not modified.
    pub fn evaluate(&self, phv: &Phv) -> StageOutput {
        let input = MatchInput::gather(&self.input_xbar, phv);
        let bus = self.action_xbar.assemble(phv);
        let engine = ActionEngine::new(&self.imem, &bus);

        let mut tables: SmallVec<[TableResult; 4]> = SmallVec::new();
        let mut writes = Vec::new();
        let mut undefined = Vec::new();

        for lt in self.active_tables(phv.direction()) {
            let outcome = self.lookup(lt, &input);
            let addresses = self.address_map.resolve(lt, &outcome);
            log::debug!("table {}: {} -> {}", lt, outcome, addresses);

            let (w, u) = engine.execute(
                lt,
                addresses.get(ResourceKind::ActionInstruction) as u8,
                addresses.get(ResourceKind::ImmediateData),
                phv,
            );
            writes.extend(w);
            undefined.extend(u);
            tables.push(TableResult { logical_table: lt, outcome, addresses });
        }

        let mut out = phv.clone();
        for w in merge_writes(writes) {
            out.write_result(w.container, w.value, w.valid);
        }
        if !undefined.is_empty() {
            log::warn!("{} undefined operand read(s) in this packet", undefined.len());
        }
        StageOutput { phv: out, tables, undefined }
    }
}
