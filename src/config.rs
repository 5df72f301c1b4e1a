//! Configuration management for mau-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (MAU_EMU_ERRATA, MAU_EMU_FAIL_ON_UNDEFINED)
//! 2. Project-local config file (`./mau-emu.toml`)
//! 3. User config file (`~/.config/mau-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # mau-emu.toml
//!
//! # Hardware errata to model, applied in this order
//! errata = ["regs_31841", "unused_swizzle_identity"]
//!
//! # Treat reads of undefined containers as a failure
//! fail_on_undefined = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::ConfigError;
use crate::mau::HardwareErratum;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// mau-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Erratum names to enable.
    pub errata: Option<Vec<String>>,

    /// Fail a run when an action reads an undefined source.
    pub fail_on_undefined: Option<bool>,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides(|key| std::env::var(key).ok());

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Enabled errata, parsed.
    pub fn errata(&self) -> Result<Vec<HardwareErratum>, ConfigError> {
        match &self.errata {
            Some(names) => HardwareErratum::parse_list(&names.join(",")),
            None => Ok(Vec::new()),
        }
    }

    pub fn fail_on_undefined(&self) -> bool {
        self.fail_on_undefined.unwrap_or(false)
    }

    /// Load user configuration from ~/.config/mau-emu/config.toml
    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// Load project-local configuration from ./mau-emu.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("mau-emu.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.errata.is_some() {
            self.errata = other.errata;
        }
        if other.fail_on_undefined.is_some() {
            self.fail_on_undefined = other.fail_on_undefined;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(list) = var("MAU_EMU_ERRATA") {
            log::info!("Using MAU_EMU_ERRATA from environment: {}", list);
            self.errata = Some(list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
        }
        if let Some(flag) = var("MAU_EMU_FAIL_ON_UNDEFINED") {
            match flag.trim() {
                "1" | "true" | "yes" => self.fail_on_undefined = Some(true),
                "0" | "false" | "no" => self.fail_on_undefined = Some(false),
                other => log::warn!("Ignoring MAU_EMU_FAIL_ON_UNDEFINED={}", other),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mau-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# mau-emu configuration
# Place this file at ~/.config/mau-emu/config.toml or ./mau-emu.toml

# Hardware errata to model (regs_31841, unused_swizzle_identity, tcam_payload_zero)
errata = ["regs_31841"]

# Fail when an action reads a container that was never written
# fail_on_undefined = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.errata(), Ok(vec![]));
        assert!(!config.fail_on_undefined());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config { errata: Some(vec!["regs_31841".to_string()]), fail_on_undefined: Some(true) };
        let overlay = Config { errata: None, fail_on_undefined: Some(false) };

        base.merge(overlay);

        // errata unchanged (overlay was None)
        assert_eq!(base.errata(), Ok(vec![HardwareErratum::Regs31841]));
        assert!(!base.fail_on_undefined());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("MAU_EMU_ERRATA", "tcam_payload_zero, regs_31841"), ("MAU_EMU_FAIL_ON_UNDEFINED", "yes")].into();
        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.errata(), Ok(vec![HardwareErratum::Regs31841, HardwareErratum::TcamPayloadZero]));
        assert!(config.fail_on_undefined());
    }

    #[test]
    fn test_unknown_erratum_in_config() {
        let config = Config { errata: Some(vec!["bogus".to_string()]), fail_on_undefined: None };
        assert!(matches!(config.errata(), Err(ConfigError::UnknownErratum(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.errata(), Ok(vec![HardwareErratum::Regs31841]));
    }
}
