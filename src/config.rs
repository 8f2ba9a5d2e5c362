//! Service configuration.
//!
//! Runtime-tunable parameters of the dispatcher and the submission path.
//! Table sizes are compile-time constants; everything here is clamped to
//! them by [`JvConfig::validate`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::power::PM_MAX_BINDINGS;
use crate::types::MAX_PAYLOAD;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JvConfig {
    /// Power-profile bindings kept at once (1..=PM_MAX_BINDINGS).
    pub max_power_profiles: u8,
    /// Largest read a single command may request (1..=MAX_PAYLOAD).
    /// Larger requests are trimmed at submission.
    pub max_read_len: u16,
    /// Reopen a listening port when an accepted session of a full server
    /// closes.
    pub rearm_listener: bool,
}

impl Default for JvConfig {
    fn default() -> Self {
        Self {
            max_power_profiles: PM_MAX_BINDINGS as u8,
            max_read_len: MAX_PAYLOAD as u16,
            rearm_listener: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is outside its permitted range.
    OutOfRange(&'static str),
    /// Stored bytes could not be decoded.
    Decode,
    /// Configuration could not be encoded.
    Encode,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(field) => write!(f, "{field} out of range"),
            Self::Decode => write!(f, "config decode failed"),
            Self::Encode => write!(f, "config encode failed"),
        }
    }
}

impl JvConfig {
    /// Reject values outside the compiled table sizes instead of clamping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_power_profiles == 0 || self.max_power_profiles as usize > PM_MAX_BINDINGS {
            return Err(ConfigError::OutOfRange("max_power_profiles"));
        }
        if self.max_read_len == 0 || self.max_read_len as usize > MAX_PAYLOAD {
            return Err(ConfigError::OutOfRange("max_read_len"));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|_| ConfigError::Encode)
    }

    /// Compact encoding for persisted settings.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }
}
