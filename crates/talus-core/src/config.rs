//! # Engine Configuration
//!
//! Runtime knobs for a project session, loadable from TOML:
//!
//! ```toml
//! history_limit = 500
//! max_snapshot_bytes = 16777216
//! normalize_after_migration = true
//! ```
//!
//! Every key is optional. Environment overrides:
//! - `TALUS_HISTORY_LIMIT`: undo history depth
//! - `TALUS_MAX_SNAPSHOT_BYTES`: largest snapshot JSON accepted on load
//!
//! Values that are not positive integers are ignored with a warning.

use crate::TalusError;
use crate::primitives::{DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_SNAPSHOT_BYTES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding `history_limit`.
pub const ENV_HISTORY_LIMIT: &str = "TALUS_HISTORY_LIMIT";

/// Environment variable overriding `max_snapshot_bytes`.
pub const ENV_MAX_SNAPSHOT_BYTES: &str = "TALUS_MAX_SNAPSHOT_BYTES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Commands kept in undo history; the oldest are dropped beyond this.
    pub history_limit: usize,
    /// Upper bound for snapshot JSON accepted by the session loader.
    pub max_snapshot_bytes: usize,
    /// Run `normalize_graph` after a load-time migration.
    pub normalize_after_migration: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
            normalize_after_migration: true,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, TalusError> {
        let config: Self =
            toml::from_str(source).map_err(|e| TalusError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TalusError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| TalusError::IoError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!(path = %path.display(), "engine configuration loaded");
        Ok(config)
    }

    /// Apply `TALUS_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment, in production).
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(limit) = parse_override(&lookup, ENV_HISTORY_LIMIT) {
            self.history_limit = limit;
        }
        if let Some(bytes) = parse_override(&lookup, ENV_MAX_SNAPSHOT_BYTES) {
            self.max_snapshot_bytes = bytes;
        }
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), TalusError> {
        if self.history_limit == 0 {
            return Err(TalusError::ConfigError(
                "history_limit must be at least 1".to_string(),
            ));
        }
        if self.max_snapshot_bytes == 0 {
            return Err(TalusError::ConfigError(
                "max_snapshot_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "override must be a positive integer; ignored");
            None
        }
    }
}
