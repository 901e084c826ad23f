//! REST adapters for the authentication backend and the profile store.
//!
//! The auth API follows the GoTrue conventions (`/token`, `/user`, `/logout`,
//! `/recover`); the profile store is a PostgREST-style table endpoint.

use serde::{Deserialize, Serialize};

use super::BackendError;

mod auth;
mod profile;

pub use auth::HttpAuthBackend;
pub use profile::HttpProfileStore;

/// Endpoint configuration shared by both HTTP adapters.
///
/// ```
/// use fitsync::backend::HttpBackendConfig;
///
/// let config = HttpBackendConfig::new(
///     "https://project.example.com/auth/v1",
///     "https://project.example.com/rest/v1",
///     "public-anon-key",
/// );
/// assert_eq!(config.profile_table, "profiles");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Base URL of the auth API
    pub auth_url: String,

    /// Base URL of the REST API serving the profile table
    pub rest_url: String,

    /// Project API key sent as `apikey` on every request
    pub api_key: String,

    /// Name of the profile table
    #[serde(default = "default_profile_table")]
    pub profile_table: String,
}

fn default_profile_table() -> String {
    "profiles".to_string()
}

impl HttpBackendConfig {
    pub fn new(
        auth_url: impl Into<String>,
        rest_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            auth_url: auth_url.into(),
            rest_url: rest_url.into(),
            api_key: api_key.into(),
            profile_table: default_profile_table(),
        }
    }

    /// Check that both base URLs parse and the key is present.
    pub fn validate(&self) -> Result<(), BackendError> {
        for (name, value) in [("auth_url", &self.auth_url), ("rest_url", &self.rest_url)] {
            url::Url::parse(value).map_err(|e| BackendError::InvalidConfig {
                reason: format!("{name} '{value}' is not a valid URL: {e}"),
            })?;
        }
        if self.api_key.is_empty() {
            return Err(BackendError::InvalidConfig {
                reason: "api_key is empty".to_string(),
            });
        }
        if self.profile_table.is_empty() {
            return Err(BackendError::InvalidConfig {
                reason: "profile_table is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Join a base URL and a path without caring about trailing slashes.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a [`BackendError`].
///
/// The backend's JSON error body is mined for a human-readable message.
pub(crate) async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|json| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|field| json.get(field).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or(body);
    BackendError::Status { status, message }
}

pub(crate) fn transport_error(e: reqwest::Error) -> BackendError {
    BackendError::transport(e.to_string())
}
