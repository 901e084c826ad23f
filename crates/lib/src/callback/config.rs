//! Redirect callback configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_REDIRECT_TIMEOUT_MS;

/// Where the callback flow sends the user, and how long it may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Absolute bound on the whole flow
    pub timeout_ms: u64,

    /// Unauthenticated entry point, used on failure and timeout
    pub sign_in_path: String,

    /// Destination after a successful sign-in
    pub home_path: String,

    /// Destination after a password-recovery link
    pub recovery_path: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_REDIRECT_TIMEOUT_MS,
            sign_in_path: "/login".to_string(),
            home_path: "/".to_string(),
            recovery_path: "/reset-password".to_string(),
        }
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}
