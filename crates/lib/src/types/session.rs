//! Session credentials issued by the authentication backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::Clock;

/// Access and refresh token pair.
///
/// Token material is wiped from memory when the value is dropped and never
/// appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    access_token: String,
    refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// An authenticated session for one subject.
///
/// Owned by the authentication backend; the engine only ever holds a
/// read-only copy, replaced wholesale on refresh and dropped on sign-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject user id
    pub user_id: String,

    /// Subject email, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry as Unix seconds
    pub expires_at: i64,

    credentials: Credentials,
}

impl Session {
    /// Create a session from its parts.
    pub fn new(
        user_id: impl Into<String>,
        credentials: Credentials,
        expires_at: i64,
        email: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            expires_at,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn access_token(&self) -> &str {
        self.credentials.access_token()
    }

    pub fn refresh_token(&self) -> &str {
        self.credentials.refresh_token()
    }

    /// Whether the session's expiry has passed according to `clock`.
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now_secs() >= self.expires_at
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn expires_in(&self, clock: &dyn Clock) -> i64 {
        (self.expires_at - clock.now_secs()).max(0)
    }
}
