//! Tool configuration.
//!
//! An optional TOML file supplies defaults for the packaging commands. It is
//! only loaded when explicitly passed with `--config`; command-line flags
//! always take priority over values in the file.
//!
//! Example:
//! ```toml
//! created_by = "STM32N6 Model Packager v2.1"
//!
//! [ota]
//! sequence = 3
//! clean_suffix = "_ota.bin"
//!
//! [version]
//! input = "version.mk"
//! output = "Custom/Common/Inc/version.h"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default suffix of OTA images removed by `ota clean`.
pub const DEFAULT_CLEAN_SUFFIX: &str = "_ota.bin";

/// Default make fragment read by `version-header`.
pub const DEFAULT_VERSION_INPUT: &str = "version.mk";

/// Default header written by `version-header`.
pub const DEFAULT_VERSION_OUTPUT: &str = "Custom/Common/Inc/version.h";

/// Parsed configuration file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackConfig {
    /// Creator identity written into package metadata.
    pub created_by: Option<String>,
    /// OTA image defaults.
    #[serde(default)]
    pub ota: OtaConfig,
    /// Version header defaults.
    #[serde(default)]
    pub version: VersionConfig,
}

/// `[ota]` table.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OtaConfig {
    /// Sequence number written into OTA headers.
    pub sequence: Option<u32>,
    /// Suffix of files removed by `ota clean`.
    pub clean_suffix: Option<String>,
}

/// `[version]` table.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    /// Make fragment holding `VERSION_*` assignments.
    pub input: Option<PathBuf>,
    /// Generated header path.
    pub output: Option<PathBuf>,
}

impl PackConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config("load", format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::config("parse", format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// OTA sequence number, CLI value first.
    pub fn ota_sequence(&self, cli: Option<u32>) -> u32 {
        cli.or(self.ota.sequence).unwrap_or(1)
    }

    /// OTA clean suffix, CLI value first.
    pub fn clean_suffix(&self, cli: Option<String>) -> String {
        cli.or_else(|| self.ota.clean_suffix.clone())
            .unwrap_or_else(|| DEFAULT_CLEAN_SUFFIX.to_string())
    }

    /// Version header input path, CLI value first.
    pub fn version_input(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.version.input.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VERSION_INPUT))
    }

    /// Version header output path, CLI value first.
    pub fn version_output(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.version.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VERSION_OUTPUT))
    }
}
