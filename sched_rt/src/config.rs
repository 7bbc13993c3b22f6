//! Engine configuration
//!
//! The policy is an init-time choice: it is read once when the engine is
//! built and resolved to a key function. Everything sized by
//! `max_threads` is allocated at that point too.

use crate::error::ConfigError;
use crate::policy::PolicyKind;
use serde::{Deserialize, Serialize};

/// Default number of thread slots
pub const DEFAULT_MAX_THREADS: usize = 64;

/// Optional statistics fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Keep sums of squares for streaming variance
    pub squared: bool,
    /// Keep last activation/ready/start/completion timestamps
    pub detailed: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            squared: true,
            detailed: true,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ranking policy
    pub policy: PolicyKind,
    /// Number of pre-allocated thread slots
    pub max_threads: usize,
    /// Statistics options
    pub stats: StatsConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            max_threads: DEFAULT_MAX_THREADS,
            stats: StatsConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Default configuration with a given policy
    pub fn with_policy(policy: PolicyKind) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration can build an engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
