//! Error types for the external authentication backend and profile store.

use thiserror::Error;

/// Errors reported by [`AuthBackend`](super::AuthBackend) and
/// [`ProfileStore`](super::ProfileStore) implementations.
///
/// A missing profile row is not an error at this layer: `fetch_profile`
/// returns `Ok(None)` and the resolver decides what that means.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// The backend answered with a non-success status.
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Credentials or tokens were rejected.
    #[error("Invalid credentials: {reason}")]
    InvalidCredentials { reason: String },

    /// The backend's answer could not be understood.
    #[error("Invalid response from backend: {reason}")]
    InvalidResponse { reason: String },

    /// The operation requires an established session.
    #[error("No active session")]
    NoSession,

    /// The adapter was configured with unusable settings.
    #[error("Invalid backend configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl BackendError {
    pub fn transport(reason: impl Into<String>) -> Self {
        BackendError::Transport {
            reason: reason.into(),
        }
    }

    /// Network-level or server-side failure that may succeed on retry.
    pub fn is_transport_error(&self) -> bool {
        match self {
            BackendError::Transport { .. } => true,
            BackendError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error means the caller's credentials were refused.
    pub fn is_rejected(&self) -> bool {
        match self {
            BackendError::InvalidCredentials { .. } => true,
            BackendError::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
