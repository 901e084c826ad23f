//! Error types for the session engine.

use thiserror::Error;

/// Errors returned by [`SessionEngine`](super::SessionEngine) operations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine has been unmounted; no further operations are possible.
    #[error("Session engine is unmounted")]
    Unmounted,

    /// The operation needs a signed-in user.
    #[error("No user is signed in")]
    NotAuthenticated,

    /// The user authenticated but has no profile; the session was revoked.
    #[error("Invalid account: no profile exists for user {user_id}")]
    InvalidAccount { user_id: String },

    /// The profile for a fresh sign-in was not resolved in time.
    #[error("Sign-in did not complete within {timeout_ms}ms")]
    SignInTimeout { timeout_ms: u64 },

    /// The session ended or was replaced before the user's identity settled.
    #[error("Session for user {user_id} ended before its profile was resolved")]
    SignInInterrupted { user_id: String },

    /// Mounting requires a running Tokio runtime.
    #[error("Session engine must be mounted inside a Tokio runtime")]
    NoRuntime,
}

impl EngineError {
    /// Check if this error means the engine is gone.
    pub fn is_unmounted(&self) -> bool {
        matches!(self, EngineError::Unmounted)
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::SignInTimeout { .. })
    }

    /// Check if this error is the invalid-account condition.
    pub fn is_invalid_account(&self) -> bool {
        matches!(self, EngineError::InvalidAccount { .. })
    }
}

impl From<EngineError> for crate::Error {
    fn from(err: EngineError) -> Self {
        crate::Error::Engine(err)
    }
}
