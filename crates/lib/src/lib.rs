//!
//! fitsync: session and identity synchronization for the fitness planner client.
//! This library turns an authentication backend's event stream and a remote profile
//! table into one consistent answer to "who is using the app and what may they do".
//!
//! ## Core Concepts
//!
//! * **Backends (`backend::AuthBackend`, `backend::ProfileStore`)**: The external collaborators. The auth backend owns the session and announces every change as an `AuthEvent`; the profile store holds one profile row per user.
//! * **Session Cache (`cache::SessionCache`)**: The last known profile per user, kept in a pluggable `KeyValueStore` so it survives remounts. Cleared on sign-out.
//! * **Request Tracker (`tracker::RequestTracker`)**: Cooperative cancellation. Every profile fetch holds a `RequestGuard`; cancelling bumps a generation and late results are dropped.
//! * **Profile Resolver (`resolver::ProfileResolver`)**: Cache-first for restored sessions and token refreshes, revalidating for fresh sign-ins.
//! * **Event Router (`router::EventRouter`)**: Drops irrelevant and immediately repeated events, and holds events back while the startup snapshot is taken.
//! * **Session Engine (`engine::SessionEngine`)**: The state machine that ties the above together and publishes a `types::DerivedIdentity`.
//! * **Callback Handler (`callback::CallbackHandler`)**: Exchanges the credentials carried by an email or provider redirect for a session, within a hard time bound.

pub mod backend;
pub mod cache;
pub mod callback;
pub mod clock;
pub mod constants;
pub mod engine;
pub mod resolver;
pub mod router;
pub mod tracker;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use engine::{EngineConfig, SessionEngine, WeakSessionEngine};
pub use types::{CurrentUser, DerivedIdentity, Profile, Role, Session};

/// Result type used throughout the fitsync library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the fitsync library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured cache errors from the cache module
    #[error(transparent)]
    Cache(cache::CacheError),

    /// Structured errors from the auth backend and profile store adapters
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Structured profile resolution errors from the resolver module
    #[error(transparent)]
    Resolve(resolver::ResolveError),

    /// Structured engine errors from the engine module
    #[error(transparent)]
    Engine(engine::EngineError),

    /// Structured redirect errors from the callback module
    #[error(transparent)]
    Callback(callback::CallbackError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
            Error::Cache(_) => "cache",
            Error::Backend(_) => "backend",
            Error::Resolve(_) => "resolver",
            Error::Engine(_) => "engine",
            Error::Callback(_) => "callback",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Resolve(resolve_err) => resolve_err.is_not_found(),
            Error::Backend(backend::BackendError::Status { status, .. }) => *status == 404,
            _ => false,
        }
    }

    /// Check if this error is a network or server failure that may succeed on retry.
    pub fn is_transport_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_transport_error(),
            Error::Resolve(resolve_err) => resolve_err.is_fetch_failed(),
            _ => false,
        }
    }

    /// Check if this error means credentials were refused.
    pub fn is_rejected(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_rejected(),
            _ => false,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_timeout(),
            Error::Callback(callback_err) => callback_err.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error is the invalid-account condition.
    pub fn is_invalid_account(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_invalid_account(),
            Error::Resolve(resolve_err) => resolve_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error means the engine is no longer mounted.
    pub fn is_unmounted(&self) -> bool {
        match self {
            Error::Engine(engine_err) => engine_err.is_unmounted(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Cache(cache_err) => cache_err.is_io_error(),
            _ => false,
        }
    }
}
