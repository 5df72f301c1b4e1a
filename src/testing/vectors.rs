//! Test vectors defined by TOML manifests.
//!
//! A manifest programs a stage (optionally from a register script next to
//! it, then from its own `write`/`indirect` tables) and lists packets with
//! the PHV each one must produce. Containers not named in `expect` must come
//! out unchanged.
//!
//! # Example Manifest
//!
//! ```toml
//! [vector]
//! name = "tcam_index_280"
//! description = "TCAM hit drives the default action instruction address"
//! errata = ["regs_31841"]
//!
//! [[write]]
//! reg = "mau_action_instruction_adr_default[0]"
//! value = 5
//!
//! [[indirect]]
//! reg = "tcam[0][0][280]"
//! word0 = "0x0c73015a79bd"
//! word1 = "0x138cfea58643"
//!
//! [[packet]]
//! direction = "ingress"
//! input = { W1 = "0xc67f52c3", B0 = 0x21 }
//! expect = { W2 = 7 }
//! expect_invalid = ["H3"]
//! hits = [0]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::device::phv::{ContainerId, Direction, Phv};
use crate::device::state::StageState;
use crate::mau::{HardwareErratum, MauStage, StageOutput};
use crate::parser::regblob::RegCommand;
use crate::parser::regscript::{parse_address, parse_number, RegScript};

/// Test manifest defining one vector.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorManifest {
    pub vector: VectorInfo,
    #[serde(default)]
    pub write: Vec<WriteDef>,
    #[serde(default)]
    pub indirect: Vec<IndirectDef>,
    #[serde(default)]
    pub packet: Vec<PacketDef>,
}

/// Vector metadata and stage options.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub errata: Vec<String>,
    /// Register script applied before the manifest's own writes, relative
    /// to the manifest
    #[serde(default)]
    pub script: Option<String>,
}

/// Number given as a TOML integer or a (possibly hex) string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    pub fn value(&self) -> Result<u128> {
        match self {
            Number::Int(v) => Ok(*v as u128),
            Number::Text(s) => parse_number(s),
        }
    }

    fn value_u32(&self) -> Result<u32> {
        let v = self.value()?;
        u32::try_from(v).map_err(|_| anyhow!("0x{:X} wider than 32 bits", v))
    }
}

/// Direct register write.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteDef {
    pub reg: String,
    pub value: Number,
}

/// Memory write.
#[derive(Debug, Clone, Deserialize)]
pub struct IndirectDef {
    pub reg: String,
    pub word0: Number,
    pub word1: Number,
}

/// One packet and its expected result.
#[derive(Debug, Clone, Deserialize)]
pub struct PacketDef {
    #[serde(default)]
    pub direction: PacketDirection,
    #[serde(default)]
    pub input: BTreeMap<String, Number>,
    #[serde(default)]
    pub expect: BTreeMap<String, Number>,
    #[serde(default)]
    pub expect_invalid: Vec<String>,
    /// Logical tables that must hit
    #[serde(default)]
    pub hits: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketDirection {
    #[default]
    Ingress,
    Egress,
}

impl From<PacketDirection> for Direction {
    fn from(d: PacketDirection) -> Self {
        match d {
            PacketDirection::Ingress => Direction::Ingress,
            PacketDirection::Egress => Direction::Egress,
        }
    }
}

/// A container (or table) whose output differs from the expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Container {
        packet: usize,
        container: ContainerId,
        expected: Option<u32>,
        actual: Option<u32>,
    },
    NoHit {
        packet: usize,
        logical_table: u8,
    },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<u32>| v.map_or("invalid".to_string(), |v| format!("0x{:X}", v));
        match self {
            Mismatch::Container { packet, container, expected, actual } => write!(
                f,
                "packet {}: {} expected {} got {}",
                packet,
                container,
                show(expected),
                show(actual)
            ),
            Mismatch::NoHit { packet, logical_table } => {
                write!(f, "packet {}: logical table {} did not hit", packet, logical_table)
            }
        }
    }
}

/// Result of running a vector.
#[derive(Debug)]
pub struct VectorResult {
    pub name: String,
    pub passed: bool,
    pub packets: usize,
    pub mismatches: Vec<Mismatch>,
    pub error: Option<String>,
}

impl VectorResult {
    fn failed(name: &str, error: anyhow::Error) -> Self {
        Self { name: name.to_string(), passed: false, packets: 0, mismatches: Vec::new(), error: Some(format!("{:#}", error)) }
    }
}

impl VectorManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn errata(&self) -> Result<Vec<HardwareErratum>> {
        Ok(HardwareErratum::parse_list(&self.vector.errata.join(","))?)
    }

    /// Register commands from the manifest's own tables, writes first.
    pub fn commands(&self) -> Result<Vec<RegCommand>> {
        let mut cmds = Vec::with_capacity(self.write.len() + self.indirect.len());
        for w in &self.write {
            let address = parse_address(&w.reg)?;
            cmds.push(RegCommand::Write { address, value: w.value.value().with_context(|| w.reg.clone())? });
        }
        for m in &self.indirect {
            let address = parse_address(&m.reg)?;
            cmds.push(RegCommand::Indirect {
                address,
                word0: m.word0.value().with_context(|| m.reg.clone())?,
                word1: m.word1.value().with_context(|| m.reg.clone())?,
            });
        }
        Ok(cmds)
    }
}

fn container(name: &str) -> Result<ContainerId> {
    name.parse().map_err(|e| anyhow!("{}", e))
}

impl PacketDef {
    pub fn input_phv(&self) -> Result<Phv> {
        let mut phv = Phv::new(self.direction.into());
        for (name, value) in &self.input {
            phv.set(container(name)?, value.value_u32()?).with_context(|| format!("input {}", name))?;
        }
        Ok(phv)
    }

    /// The input PHV with the expected changes applied.
    pub fn expected_phv(&self) -> Result<Phv> {
        let mut phv = self.input_phv()?;
        for (name, value) in &self.expect {
            phv.set(container(name)?, value.value_u32()?).with_context(|| format!("expect {}", name))?;
        }
        for name in &self.expect_invalid {
            phv.invalidate(container(name)?);
        }
        Ok(phv)
    }

    fn compare(&self, packet: usize, out: &StageOutput) -> Result<Vec<Mismatch>> {
        let expected = self.expected_phv()?;
        let mut mismatches: Vec<Mismatch> = ContainerId::all()
            .filter(|&c| expected.value(c) != out.phv.value(c))
            .map(|c| Mismatch::Container { packet, container: c, expected: expected.value(c), actual: out.phv.value(c) })
            .collect();
        for &lt in &self.hits {
            if !out.table(lt).is_some_and(|t| t.outcome.is_hit()) {
                mismatches.push(Mismatch::NoHit { packet, logical_table: lt });
            }
        }
        Ok(mismatches)
    }
}

/// Runs vector manifests.
#[derive(Debug, Default)]
pub struct VectorRunner {
    /// Errata added to every vector's own list
    extra_errata: Vec<HardwareErratum>,
}

impl VectorRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_errata(mut self, errata: Vec<HardwareErratum>) -> Self {
        self.extra_errata = errata;
        self
    }

    /// Find `*.toml` manifests in a directory, sorted by name.
    pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "toml") {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Load and run one manifest file.
    pub fn run_file(&self, path: &Path) -> VectorResult {
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        match VectorManifest::from_file(path) {
            Ok(manifest) => self.run(&manifest, path.parent()),
            Err(e) => VectorResult::failed(&name, e),
        }
    }

    /// Run a manifest. `base` resolves a relative `script` path.
    pub fn run(&self, manifest: &VectorManifest, base: Option<&Path>) -> VectorResult {
        match self.try_run(manifest, base) {
            Ok(result) => result,
            Err(e) => VectorResult::failed(&manifest.vector.name, e),
        }
    }

    fn try_run(&self, manifest: &VectorManifest, base: Option<&Path>) -> Result<VectorResult> {
        let mut errata = manifest.errata()?;
        for e in &self.extra_errata {
            if !errata.contains(e) {
                errata.push(*e);
            }
        }

        let mut state = StageState::new();
        if let Some(script) = &manifest.vector.script {
            let path = base.map_or_else(|| PathBuf::from(script), |b| b.join(script));
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let script = RegScript::parse(&text)?;
            if script.lines().len() != script.commands().count() {
                bail!("{}: vector scripts may only contain register writes", path.display());
            }
            state.apply_commands(script.commands())?;
        }
        state.apply_commands(manifest.commands()?)?;

        let mut stage: MauStage = state.build_stage(&errata)?;
        let mut mismatches = Vec::new();
        for (i, packet) in manifest.packet.iter().enumerate() {
            let out = stage.process(&packet.input_phv().with_context(|| format!("packet {}", i))?);
            if !out.undefined.is_empty() {
                log::debug!("{} packet {}: {} undefined reads", manifest.vector.name, i, out.undefined.len());
            }
            mismatches.extend(packet.compare(i, &out)?);
        }

        log::info!("{}: {} packets, {} mismatches", manifest.vector.name, manifest.packet.len(), mismatches.len());
        Ok(VectorResult {
            name: manifest.vector.name.clone(),
            passed: mismatches.is_empty(),
            packets: manifest.packet.len(),
            mismatches,
            error: None,
        })
    }
}
