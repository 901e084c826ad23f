//! PostgREST-style profile table client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{HttpBackendConfig, endpoint, error_from_response, transport_error};
use crate::{
    Result,
    backend::{AuthBackend, BackendError, ProfileStore},
    types::{DisplayName, Profile, Role},
};

const PROFILE_COLUMNS: &str = "id,first_name,last_name,role,trainer_id";

/// One row of the profile table as the REST API returns it.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    trainer_id: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            user_id: row.id,
            display_name: DisplayName::new(
                row.first_name.unwrap_or_default(),
                row.last_name.unwrap_or_default(),
            ),
            role: row.role.unwrap_or_default(),
            trainer_id: row.trainer_id,
        }
    }
}

/// Profile store reached over HTTP.
///
/// Requests carry the project API key. When an auth backend is attached with
/// [`with_auth`](Self::with_auth), the signed-in user's access token is sent
/// as the bearer so row-level policies apply.
pub struct HttpProfileStore {
    client: reqwest::Client,
    config: HttpBackendConfig,
    auth: Option<Arc<dyn AuthBackend>>,
}

impl std::fmt::Debug for HttpProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProfileStore")
            .field("rest_url", &self.config.rest_url)
            .field("table", &self.config.profile_table)
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl HttpProfileStore {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            auth: None,
        })
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthBackend>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(auth) = &self.auth
            && let Some(session) = auth.get_current_session().await?
        {
            return Ok(session.access_token().to_string());
        }
        Ok(self.config.api_key.clone())
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let url = endpoint(&self.config.rest_url, &self.config.profile_table);
        let filter = format!("eq.{user_id}");
        trace!(user_id, table = %self.config.profile_table, "Fetching profile row");

        let response = self
            .client
            .get(url)
            .query(&[("id", filter.as_str()), ("select", PROFILE_COLUMNS)])
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }

        let rows: Vec<ProfileRow> =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    reason: format!("profile rows: {e}"),
                })?;
        let profile = rows.into_iter().next().map(Profile::from);
        debug!(user_id, found = profile.is_some(), "Fetched profile");
        Ok(profile)
    }
}
