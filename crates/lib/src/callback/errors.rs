//! Error types for the redirect callback flow.

use thiserror::Error;

/// Why a redirect callback did not produce a session.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The redirect is missing parameters it must carry, or is not a URL.
    #[error("Malformed redirect: {reason}")]
    MalformedRedirect { reason: String },

    /// The identity provider reported an error in the redirect itself.
    #[error("Provider error {code}: {description}")]
    Provider { code: String, description: String },

    /// The backend refused the redirect's credentials.
    #[error("Failed to establish session: {reason}")]
    EstablishFailed { reason: String },

    /// No session was established within the time bound.
    #[error("No session established within {timeout_ms}ms")]
    RedirectTimeout { timeout_ms: u64 },

    /// The backend signed out while the flow was waiting.
    #[error("Signed out before the redirect completed")]
    SignedOut,

    /// The owning engine was unmounted.
    #[error("Redirect handling cancelled")]
    Cancelled,
}

impl CallbackError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CallbackError::MalformedRedirect {
            reason: reason.into(),
        }
    }

    /// Check if this error was detected from the URL alone, without waiting.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CallbackError::MalformedRedirect { .. } | CallbackError::Provider { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallbackError::RedirectTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallbackError::Cancelled)
    }
}

impl From<CallbackError> for crate::Error {
    fn from(err: CallbackError) -> Self {
        crate::Error::Callback(err)
    }
}
