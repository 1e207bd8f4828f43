//! Configuration model for troupe.
//!
//! This module defines the Config struct that represents `troupe.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//! A missing config file yields the defaults; a malformed one is an error.

use crate::error::{Result, TroupeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a troupe run.
///
/// This struct represents the contents of `troupe.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Generator settings
    // =========================================================================
    /// Command template invoked for each generator call. The prompt is piped
    /// on stdin and stdout is taken as the completion. Empty disables the
    /// command generator (actions then fail with GeneratorUnavailable
    /// unless a generator is bound programmatically).
    #[serde(default = "default_generator_command")]
    pub generator_command: String,

    /// Seconds before a generator call is killed and reported as a timeout.
    #[serde(default = "default_generator_timeout")]
    pub generator_timeout_seconds: u64,

    // =========================================================================
    // Workspace settings
    // =========================================================================
    /// Root directory under which project directories are created.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Seconds before a workspace shell command is killed.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    // =========================================================================
    // Team settings
    // =========================================================================
    /// Default budget ceiling in dollars when the caller does not invest.
    #[serde(default = "default_investment")]
    pub default_investment: f64,

    /// Default round limit for a run.
    #[serde(default = "default_max_rounds")]
    pub default_max_rounds: u32,

    /// Maximum messages held in a role's working memory.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    /// Capacity of a role's long-term ring memory.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Flat-rate dollar charge recorded per generator call.
    #[serde(default = "default_flat_rate")]
    pub flat_rate_cost: f64,

    // =========================================================================
    // Transcript settings
    // =========================================================================
    /// Whether to append every published message to `transcript.ndjson`
    /// in the project directory.
    #[serde(default = "default_true")]
    pub transcript: bool,
}

// Default value functions for serde
fn default_generator_command() -> String {
    String::new()
}
fn default_generator_timeout() -> u64 {
    120
}
fn default_workspace_root() -> String {
    "workspace".to_string()
}
fn default_command_timeout() -> u64 {
    60
}
fn default_investment() -> f64 {
    10.0
}
fn default_max_rounds() -> u32 {
    8
}
fn default_inbox_capacity() -> usize {
    32
}
fn default_memory_capacity() -> usize {
    100
}
fn default_flat_rate() -> f64 {
    crate::budget::DEFAULT_FLAT_RATE
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator_command: default_generator_command(),
            generator_timeout_seconds: default_generator_timeout(),
            workspace_root: default_workspace_root(),
            command_timeout_seconds: default_command_timeout(),
            default_investment: default_investment(),
            default_max_rounds: default_max_rounds(),
            inbox_capacity: default_inbox_capacity(),
            memory_capacity: default_memory_capacity(),
            flat_rate_cost: default_flat_rate(),
            transcript: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: the defaults apply. A file that
    /// exists but fails to parse or validate is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            TroupeError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&raw).map_err(|e| {
            TroupeError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.generator_timeout_seconds == 0 {
            return Err(TroupeError::Config(
                "generator_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_seconds == 0 {
            return Err(TroupeError::Config(
                "command_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.default_max_rounds == 0 {
            return Err(TroupeError::Config(
                "default_max_rounds must be at least 1".to_string(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(TroupeError::Config(
                "inbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.memory_capacity == 0 {
            return Err(TroupeError::Config(
                "memory_capacity must be at least 1".to_string(),
            ));
        }
        if self.default_investment < 0.0 {
            return Err(TroupeError::Config(
                "default_investment must not be negative".to_string(),
            ));
        }
        if self.flat_rate_cost < 0.0 {
            return Err(TroupeError::Config(
                "flat_rate_cost must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
