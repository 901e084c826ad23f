//! External collaborators: the authentication backend and the profile store.
//!
//! The engine only depends on the [`AuthBackend`] and [`ProfileStore`] traits.
//! In-process implementations live in [`in_memory`]; REST clients live in
//! [`http`] behind the `http` feature.

use async_trait::async_trait;

use crate::{
    Result,
    types::{Profile, Session},
};

pub mod errors;
pub mod events;
#[cfg(feature = "http")]
pub mod http;
pub mod in_memory;

pub use errors::BackendError;
pub use events::{AuthEvent, AuthEventKind, AuthSubscription, EventBus};
#[cfg(feature = "http")]
pub use http::{HttpAuthBackend, HttpBackendConfig, HttpProfileStore};
pub use in_memory::{InMemoryAuthBackend, InMemoryProfileStore};

/// The external authentication backend.
///
/// Implementations own the session. Every change they make to it must also be
/// announced on the event stream returned by [`subscribe`](Self::subscribe),
/// which is how the engine learns about it.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The session the backend currently holds, if any.
    async fn get_current_session(&self) -> Result<Option<Session>>;

    /// Subscribe to lifecycle events.
    ///
    /// The subscription's first event is an `INITIAL_SESSION` snapshot.
    fn subscribe(&self) -> AuthSubscription;

    /// Establish a session from a token pair carried by a redirect.
    ///
    /// Emits `SIGNED_IN` on success.
    async fn establish_session(&self, access_token: &str, refresh_token: &str)
    -> Result<Session>;

    /// End the current session. Emits `SIGNED_OUT`.
    async fn sign_out(&self) -> Result<()>;

    /// Password login. Emits `SIGNED_IN` on success.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Ask the backend to send a password-reset email.
    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>)
    -> Result<()>;

    /// Change the signed-in user's password. Emits `USER_UPDATED`.
    async fn update_password(&self, new_password: &str) -> Result<()>;
}

/// The external profile store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile row for `user_id`.
    ///
    /// Returns `Ok(None)` when the store confirms there is no such row.
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>>;
}
