//! Text register script.
//!
//! A line-oriented, human-editable counterpart of the register blob that can
//! also drive packets through the stage:
//!
//! ```text
//! # comment
//! write lrt_threshold[3] 100          # direct write, by name
//! write 0x130000000000 100            # direct write, by raw address
//! indirect tcam[0][0][280] 0x0c73015a79bd 0x138cfea58643
//! dir ingress                         # start a new PHV
//! set W1 0xc67f52c3                   # load a container
//! process                             # run the current PHV through the stage
//! ```
//!
//! Missing indices default to 0. Numbers are decimal or `0x` hex, with
//! optional `_` separators.

use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use crate::device::phv::{ContainerId, Direction, Phv};
use crate::device::registers::RegAddress;
use crate::device::registers_spec::field_by_name;
use crate::device::state::StageState;
use crate::mau::{HardwareErratum, MauStage, StageOutput};
use crate::parser::regblob::RegCommand;

struct Patterns {
    /// `write <addr> <value>`
    write: Regex,
    /// `indirect <addr> <word0> <word1>`
    indirect: Regex,
    /// `dir ingress|egress`
    dir: Regex,
    /// `set <container> <value>`
    set: Regex,
    /// `process`
    process: Regex,
    /// `name[i0][i1][i2]`
    named_address: Regex,
    /// one `[n]` index
    index: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    write: Regex::new(r"^write\s+(\S+)\s+(\S+)$").unwrap(),
    indirect: Regex::new(r"^indirect\s+(\S+)\s+(\S+)\s+(\S+)$").unwrap(),
    dir: Regex::new(r"^dir\s+(ingress|egress)$").unwrap(),
    set: Regex::new(r"^set\s+(\S+)\s+(\S+)$").unwrap(),
    process: Regex::new(r"^process$").unwrap(),
    named_address: Regex::new(r"^([A-Za-z_]\w*)((?:\[\d+\]){0,3})$").unwrap(),
    index: Regex::new(r"\[(\d+)\]").unwrap(),
});

/// One script statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOp {
    /// Register or memory write
    Command(RegCommand),
    /// Start a new PHV in this direction
    Direction(Direction),
    /// Load a PHV container
    Set { container: ContainerId, value: u32 },
    /// Run the current PHV through the stage
    Process,
}

/// A statement and its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub op: ScriptOp,
}

/// Parse a number: decimal or `0x` hex, `_` allowed.
pub fn parse_number(s: &str) -> Result<u128> {
    let clean = s.replace('_', "");
    let parsed = match clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => clean.parse::<u128>(),
    };
    parsed.map_err(|_| anyhow!("bad number '{}'", s))
}

/// Parse a register address: raw number or `name[i0][i1][i2]`.
pub fn parse_address(s: &str) -> Result<u64> {
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        let raw = parse_number(s)?;
        return u64::try_from(raw).map_err(|_| anyhow!("address '{}' wider than 64 bits", s));
    }

    let p = &*PATTERNS;
    let caps = p.named_address.captures(s).ok_or_else(|| anyhow!("bad register address '{}'", s))?;
    let name = &caps[1];
    let spec = field_by_name(name).ok_or_else(|| anyhow!("no register named '{}'", name))?;

    let mut index = [0u16; 3];
    for (slot, m) in index.iter_mut().zip(p.index.captures_iter(&caps[2])) {
        *slot = m[1].parse().with_context(|| format!("index in '{}'", s))?;
    }
    Ok(RegAddress::encode(spec.block, index[0], index[1], index[2]))
}

/// Parsed register script.
#[derive(Debug, Clone, Default)]
pub struct RegScript {
    lines: Vec<ScriptLine>,
}

impl RegScript {
    /// Parse a script. Errors name the offending line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let op = Self::parse_line(line).with_context(|| format!("line {}: '{}'", n + 1, line))?;
            lines.push(ScriptLine { line: n + 1, op });
        }
        Ok(Self { lines })
    }

    fn parse_line(line: &str) -> Result<ScriptOp> {
        let p = &*PATTERNS;
        if let Some(c) = p.write.captures(line) {
            return Ok(ScriptOp::Command(RegCommand::Write {
                address: parse_address(&c[1])?,
                value: parse_number(&c[2])?,
            }));
        }
        if let Some(c) = p.indirect.captures(line) {
            return Ok(ScriptOp::Command(RegCommand::Indirect {
                address: parse_address(&c[1])?,
                word0: parse_number(&c[2])?,
                word1: parse_number(&c[3])?,
            }));
        }
        if let Some(c) = p.dir.captures(line) {
            let dir = if &c[1] == "egress" { Direction::Egress } else { Direction::Ingress };
            return Ok(ScriptOp::Direction(dir));
        }
        if let Some(c) = p.set.captures(line) {
            let container: ContainerId = c[1].parse()?;
            let value = u32::try_from(parse_number(&c[2])?).map_err(|_| anyhow!("value wider than 32 bits"))?;
            return Ok(ScriptOp::Set { container, value });
        }
        if p.process.is_match(line) {
            return Ok(ScriptOp::Process);
        }
        bail!("unrecognized statement")
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    /// Register writes only, in order.
    pub fn commands(&self) -> impl Iterator<Item = RegCommand> + '_ {
        self.lines.iter().filter_map(|l| match &l.op {
            ScriptOp::Command(cmd) => Some(cmd.clone()),
            _ => None,
        })
    }

    /// Execute the script against a stage state.
    ///
    /// The stage is (re)built at the first `process` after any write, so
    /// resource state carries over between packets only while the
    /// configuration is unchanged. `set` values persist until the next `dir`.
    pub fn run(&self, state: &mut StageState, errata: &[HardwareErratum]) -> Result<Vec<StageOutput>> {
        let mut stage: Option<MauStage> = None;
        let mut phv = Phv::ingress();
        let mut outputs = Vec::new();

        for l in &self.lines {
            match &l.op {
                ScriptOp::Command(cmd) => {
                    state.apply_command(cmd).with_context(|| format!("line {}", l.line))?;
                    stage = None;
                }
                ScriptOp::Direction(dir) => phv = Phv::new(*dir),
                ScriptOp::Set { container, value } => {
                    phv.set(*container, *value).with_context(|| format!("line {}", l.line))?;
                }
                ScriptOp::Process => {
                    if stage.is_none() {
                        let built = state.build_stage(errata).with_context(|| format!("line {}: configuring stage", l.line))?;
                        stage = Some(built);
                    }
                    if let Some(s) = stage.as_mut() {
                        outputs.push(s.process(&phv));
                    }
                }
            }
        }
        Ok(outputs)
    }
}
