//! Gate Configuration
//!
//! Defines the configuration for the submission gate including:
//! - Reserved app name
//! - Archive limits (size, entry count)
//! - External syntax check settings

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Maximum archive size (10MB)
pub const MAX_ARCHIVE_SIZE: usize = 10 * 1024 * 1024;

/// Maximum uncompressed size of a single archive entry (1MB)
pub const MAX_ENTRY_SIZE: u64 = 1024 * 1024;

/// Maximum number of entries in an archive
pub const MAX_ENTRIES: usize = 100;

/// App name used by the registry itself
pub const RESERVED_APP_NAME: &str = "ocelotcloud";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Complete gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// App name no maintainer may publish under
    pub reserved_app_name: String,
    /// Archive limits
    pub limits: ArchiveLimits,
    /// External syntax check
    pub syntax_check: SyntaxCheckConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            reserved_app_name: RESERVED_APP_NAME.to_string(),
            limits: ArchiveLimits::default(),
            syntax_check: SyntaxCheckConfig::default(),
        }
    }
}

impl GateConfig {
    /// Load configuration from a TOML file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Limits applied to uploaded archives before and during extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    /// Maximum compressed archive size in bytes
    pub max_archive_size: usize,
    /// Maximum uncompressed size of one entry in bytes
    pub max_entry_size: u64,
    /// Maximum number of entries
    pub max_entries: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_size: MAX_ARCHIVE_SIZE,
            max_entry_size: MAX_ENTRY_SIZE,
            max_entries: MAX_ENTRIES,
        }
    }
}

/// Settings for the `docker compose config` check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntaxCheckConfig {
    /// Run the check at all
    pub enabled: bool,
    /// Docker CLI binary
    pub program: String,
}

impl Default for SyntaxCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "docker".to_string(),
        }
    }
}
