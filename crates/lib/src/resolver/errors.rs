//! Error types for profile resolution.

use thiserror::Error;

/// Outcome of a resolution that produced no profile.
///
/// The two variants are operationally different and must not be conflated:
/// a missing row means the account is unusable, a failed fetch is transient.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The profile store confirmed there is no profile row for this user.
    #[error("No profile exists for user {user_id}")]
    ProfileNotFound { user_id: String },

    /// The profile could not be fetched and no cached copy exists.
    #[error("Failed to fetch profile for user {user_id}: {reason}")]
    ProfileFetchFailed { user_id: String, reason: String },
}

impl ResolveError {
    pub fn user_id(&self) -> &str {
        match self {
            ResolveError::ProfileNotFound { user_id }
            | ResolveError::ProfileFetchFailed { user_id, .. } => user_id,
        }
    }

    /// Check if this error is a confirmed absent profile row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::ProfileNotFound { .. })
    }

    /// Check if this error is a failed fetch without cache fallback.
    pub fn is_fetch_failed(&self) -> bool {
        matches!(self, ResolveError::ProfileFetchFailed { .. })
    }
}

impl From<ResolveError> for crate::Error {
    fn from(err: ResolveError) -> Self {
        crate::Error::Resolve(err)
    }
}
