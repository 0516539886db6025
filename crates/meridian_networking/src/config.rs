//! # Sync Configuration
//!
//! Loaded once at startup, typically from a TOML file:
//!
//! ```toml
//! update_period = 0.05
//! max_edits_per_message = 32
//! ```

use serde::Deserialize;

use crate::error::ConfigError;
use crate::{DEFAULT_UPDATE_PERIOD, MAX_MESSAGE_SIZE};

/// Smallest message cap accepted; a create message header must fit.
const MIN_MESSAGE_SIZE: usize = 64;

/// Replication tuning.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Seconds between two flushes of pending state.
    pub update_period: f32,
    /// Upper bound on attribute edits packed into one edit message.
    pub max_edits_per_message: usize,
    /// Byte cap for a single message. Never above [`MAX_MESSAGE_SIZE`].
    pub max_message_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_period: DEFAULT_UPDATE_PERIOD,
            max_edits_per_message: 64,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl SyncConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.update_period.is_finite() && self.update_period > 0.0) {
            return Err(ConfigError::Invalid {
                field: "update_period",
                reason: format!("must be a positive number of seconds, got {}", self.update_period),
            });
        }
        if self.max_edits_per_message == 0 {
            return Err(ConfigError::Invalid {
                field: "max_edits_per_message",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.max_message_size) {
            return Err(ConfigError::Invalid {
                field: "max_message_size",
                reason: format!(
                    "must be within {MIN_MESSAGE_SIZE}..={MAX_MESSAGE_SIZE}, got {}",
                    self.max_message_size
                ),
            });
        }
        Ok(())
    }
}
