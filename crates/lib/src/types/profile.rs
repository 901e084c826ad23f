//! Application-level profile records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role granted to a user by the profile store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Trainer,
    Admin,
    /// Regular member. Unrecognised role strings also decode to this variant.
    #[default]
    #[serde(other)]
    User,
}

impl Role {
    /// Trainers and admins may see other users' plans.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Trainer | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Given and family name as entered at registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

impl DisplayName {
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            given_name: given_name.into(),
            family_name: family_name.into(),
        }
    }

    /// Both parts joined by a space, skipping empty parts.
    pub fn full(&self) -> String {
        [self.given_name.trim(), self.family_name.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Profile row stored in the external profile store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,

    #[serde(default)]
    pub display_name: DisplayName,

    #[serde(default)]
    pub role: Role,

    /// Trainer assigned to this user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_id: Option<String>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, display_name: DisplayName, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
            role,
            trainer_id: None,
        }
    }

    pub fn with_trainer(mut self, trainer_id: impl Into<String>) -> Self {
        self.trainer_id = Some(trainer_id.into());
        self
    }
}
