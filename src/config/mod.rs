//! Graph configuration
//!
//! A [`GraphConfig`] is threaded through every pipe a graph creates. The
//! in-flight window `max_in_flight` must be identical for all pipes of one
//! graph instance: pipes and dispatch groups both address their storage by
//! `sequence_number mod max_in_flight`.
//!
//! Configurations are stored as TOML (`.toml`) or JSON (anything else).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of sequence numbers allowed in flight per pipe.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// What a pipe does when a write replaces a slot whose content was never read.
///
/// Both policies keep the overwrite (there is no backpressure) and count it
/// in the pipe statistics; they differ only in how loudly it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Count only, log at trace level.
    Silent,
    /// Count and emit a warning.
    #[default]
    Warn,
}

/// Settings shared by every pipe and dispatch group of one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum number of sequence numbers in flight (ring size `N`).
    pub max_in_flight: usize,
    /// Reporting policy for capacity overwrites.
    pub overwrite_policy: OverwritePolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            overwrite_policy: OverwritePolicy::default(),
        }
    }
}

impl GraphConfig {
    /// Configuration with the given in-flight window and default policy.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight,
            ..Self::default()
        }
    }

    pub fn with_overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite_policy = policy;
        self
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let parsed = if is_toml(path) {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        parsed.map_err(|e| e.with_context(format!("Loading config {:?}", path)))
    }

    /// Save the configuration, choosing the format by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// True if the path names a TOML document.
pub(crate) fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
