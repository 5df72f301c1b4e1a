//! Hardware errata.
//!
//! Each erratum is a named transformation of the decoded stage
//! configuration, applied after decode and before validation.

use std::fmt;
use std::str::FromStr;

use crate::device::registers_spec::{SRAM_ROWS, SWIZZLE_BUSES};
use crate::error::ConfigError;
use crate::mau::address_dist::ResourceKind;
use crate::mau::exact::SwizzleCtl;
use crate::mau::stage::StageConfig;

/// A toggleable hardware erratum workaround.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HardwareErratum {
    /// Idletime miss value follows the idletime default.
    Regs31841,
    /// Swizzle controls no enabled way reads are reset to identity.
    UnusedSwizzleIdentity,
    /// TCAM search keys drive the payload bit as 0.
    TcamPayloadZero,
}

impl HardwareErratum {
    pub const ALL: [HardwareErratum; 3] =
        [HardwareErratum::Regs31841, HardwareErratum::UnusedSwizzleIdentity, HardwareErratum::TcamPayloadZero];

    pub fn name(self) -> &'static str {
        match self {
            HardwareErratum::Regs31841 => "regs_31841",
            HardwareErratum::UnusedSwizzleIdentity => "unused_swizzle_identity",
            HardwareErratum::TcamPayloadZero => "tcam_payload_zero",
        }
    }

    /// Apply the workaround to a decoded configuration.
    pub fn apply(self, config: &mut StageConfig) {
        match self {
            HardwareErratum::Regs31841 => {
                for lt in 0..config.logical_tables() {
                    let rule = config.address_map.rule_mut(ResourceKind::Idletime, lt);
                    rule.miss_value = rule.default;
                }
            }
            HardwareErratum::UnusedSwizzleIdentity => {
                let used: Vec<(usize, usize)> = config.exact.swizzles_in_use().collect();
                for row in 0..SRAM_ROWS {
                    for bus in 0..SWIZZLE_BUSES {
                        if !used.contains(&(row, bus)) {
                            config.exact.set_swizzle(row, bus, SwizzleCtl::default());
                        }
                    }
                }
            }
            HardwareErratum::TcamPayloadZero => config.tcam.payload_bit = false,
        }
        log::debug!("applied erratum {}", self);
    }

    /// Parse a comma-separated list, ignoring blanks.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, ConfigError> {
        let mut out: Vec<Self> = s.split(',').map(str::trim).filter(|n| !n.is_empty()).map(str::parse).collect::<Result<_, _>>()?;
        out.sort();
        out.dedup();
        Ok(out)
    }
}

impl fmt::Display for HardwareErratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HardwareErratum {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| ConfigError::UnknownErratum(s.to_string()))
    }
}
