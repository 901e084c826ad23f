//! The identity projection published to consumers.

use serde::{Deserialize, Serialize};

use super::{Profile, Role, Session};

/// The current actor: session subject merged with profile fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// None while only the bare session identity is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl CurrentUser {
    /// Identity derived from the session alone.
    pub fn bare(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            email: session.email.clone(),
            profile: None,
        }
    }

    /// Identity merged with a resolved profile.
    pub fn merged(session: &Session, profile: Profile) -> Self {
        Self {
            id: session.user_id.clone(),
            email: session.email.clone(),
            profile: Some(profile),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }

    pub fn trainer_id(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.trainer_id.as_deref())
    }

    /// Display name from the profile, falling back to the email.
    pub fn display_name(&self) -> Option<String> {
        self.profile
            .as_ref()
            .map(|p| p.display_name.full())
            .filter(|name| !name.is_empty())
            .or_else(|| self.email.clone())
    }
}

/// Who is acting and what they may do.
///
/// `is_privileged` is always derived from `user`; build values through the
/// constructors rather than by hand so the two cannot disagree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedIdentity {
    pub user: Option<CurrentUser>,
    pub is_privileged: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl DerivedIdentity {
    /// Nobody signed in, nothing pending.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// State before the first snapshot has been processed.
    pub fn initializing() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn authenticated(user: CurrentUser) -> Self {
        Self {
            is_privileged: user.role().is_some_and(Role::is_privileged),
            user: Some(user),
            loading: false,
            error: None,
        }
    }

    pub fn with_loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}
