//! Engine configuration.
//!
//! # Invariants
//! - Every field has a default, so a partial JSON file is valid.
//! - `page_size` and `backfill_cap` are never zero after [`EngineConfig::validate`].

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_BACKFILL_CAP: u32 = 10_000;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(details) => write!(f, "invalid config: {details}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Tunables shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Follower page size for fan-out and association batch size for
    /// group-state processing.
    pub page_size: u32,
    /// Upper bound of feed rows created by one follow command.
    pub backfill_cap: u32,
    /// Log level passed to [`crate::init_logging`].
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            backfill_cap: DEFAULT_BACKFILL_CAP,
            log_level: crate::default_log_level().to_string(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("pageSize must be greater than zero"));
        }
        if self.backfill_cap == 0 {
            return Err(ConfigError::Invalid("backfillCap must be greater than zero"));
        }
        Ok(())
    }
}
