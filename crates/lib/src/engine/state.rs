//! Observable engine state besides the published identity.

use crate::types::Role;

/// Lifecycle phase of the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnginePhase {
    #[default]
    Uninitialized,
    /// Waiting for the backend's current-session snapshot.
    Initializing,
    Authenticated,
    Anonymous,
    /// Terminal.
    Unmounted,
}

impl EnginePhase {
    /// Whether the initial snapshot has been applied.
    pub fn is_ready(self) -> bool {
        matches!(self, EnginePhase::Authenticated | EnginePhase::Anonymous)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnginePhase::Uninitialized => "uninitialized",
            EnginePhase::Initializing => "initializing",
            EnginePhase::Authenticated => "authenticated",
            EnginePhase::Anonymous => "anonymous",
            EnginePhase::Unmounted => "unmounted",
        }
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notable outcomes, broadcast for consumers that surface them (toasts, logs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineNotice {
    /// A profile was resolved and published.
    ProfileResolved {
        user_id: String,
        role: Role,
        /// The profile store could not be read and an earlier copy was kept.
        stale: bool,
    },
    /// Resolution failed with no earlier copy to fall back on; the bare
    /// identity was published with the error.
    ResolutionFailed { user_id: String, reason: String },
    /// The user has no profile row; the session is being revoked.
    InvalidAccount { user_id: String },
    SignedOut,
}
