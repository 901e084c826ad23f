//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SIGN_IN_TIMEOUT_MS, PROFILE_CACHE_PREFIX};

/// Tunables for a [`SessionEngine`](super::SessionEngine).
///
/// ```
/// use fitsync::engine::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"sign_in_timeout_ms": 2500}"#).unwrap();
/// assert_eq!(config.sign_in_timeout().as_millis(), 2500);
/// assert_eq!(config.cache_prefix, "fitsync:profile:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key prefix of profile cache entries
    pub cache_prefix: String,

    /// How long `sign_in_with_password` waits for the profile to resolve
    pub sign_in_timeout_ms: u64,

    /// Capacity of the command channel to the engine task
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_prefix: PROFILE_CACHE_PREFIX.to_string(),
            sign_in_timeout_ms: DEFAULT_SIGN_IN_TIMEOUT_MS,
            command_buffer: 32,
        }
    }
}

impl EngineConfig {
    pub fn sign_in_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_in_timeout_ms)
    }

    pub fn with_sign_in_timeout(mut self, timeout: Duration) -> Self {
        self.sign_in_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }
}
