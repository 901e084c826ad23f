//! GoTrue-style authentication client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{HttpBackendConfig, endpoint, error_from_response, transport_error};
use crate::{
    Result,
    backend::{AuthBackend, AuthEvent, AuthSubscription, BackendError, EventBus},
    clock::{Clock, SystemClock},
    types::{Credentials, Session},
};

/// Lifetime assumed when neither the response nor the token carries an expiry.
const FALLBACK_TTL_SECS: i64 = 3600;

/// Refresh this many seconds before the recorded expiry.
const REFRESH_MARGIN_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim from a JWT without verifying it.
///
/// Verification is the backend's job; the expiry is only used to decide when
/// to refresh.
fn jwt_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<JwtClaims>(&bytes).ok()?.exp
}

/// Authentication backend reached over HTTP.
///
/// Holds the current session in memory and announces every change on its
/// event stream, the way a browser auth client does.
pub struct HttpAuthBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
    session: Mutex<Option<Session>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpAuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthBackend")
            .field("auth_url", &self.config.auth_url)
            .field("session", &self.session.lock().unwrap().as_ref().map(|s| &s.user_id))
            .finish()
    }
}

impl HttpAuthBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            session: Mutex::new(None),
            bus: EventBus::default(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a preconfigured `reqwest` client (proxies, timeouts, ...).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Seed a session restored from elsewhere, without emitting an event.
    pub fn restore_session(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.config.auth_url, path)
    }

    fn current(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    fn install(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    fn session_from_tokens(&self, tokens: TokenResponse) -> Session {
        let now = self.clock.now_secs();
        let expires_at = tokens
            .expires_at
            .or_else(|| tokens.expires_in.map(|secs| now + secs))
            .or_else(|| jwt_expiry(&tokens.access_token))
            .unwrap_or(now + FALLBACK_TTL_SECS);
        Session::new(
            tokens.user.id,
            Credentials::new(tokens.access_token, tokens.refresh_token),
            expires_at,
            tokens.user.email,
        )
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_client_error() {
            let err = error_from_response(response).await;
            let reason = match err {
                BackendError::Status { message, .. } => message,
                other => other.to_string(),
            };
            return Err(BackendError::InvalidCredentials { reason }.into());
        }
        if !status.is_success() {
            return Err(error_from_response(response).await.into());
        }

        let tokens: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    reason: format!("token response: {e}"),
                })?;
        Ok(self.session_from_tokens(tokens))
    }

    /// Exchange the refresh token for a new session and announce it.
    pub async fn refresh_session(&self) -> Result<Session> {
        let refresh_token = self
            .current()
            .map(|s| s.refresh_token().to_string())
            .ok_or(BackendError::NoSession)?;
        let session = self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;
        debug!(user_id = %session.user_id, "Refreshed session");
        self.install(session.clone());
        self.bus.emit(AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserResponse> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_client_error() {
            let err = error_from_response(response).await;
            return Err(BackendError::InvalidCredentials {
                reason: err.to_string(),
            }
            .into());
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        Ok(response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                reason: format!("user response: {e}"),
            })?)
    }

    fn clear_local(&self) -> Option<Session> {
        let previous = self.session.lock().unwrap().take();
        self.bus.emit(AuthEvent::signed_out());
        previous
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn get_current_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if session.expires_in(self.clock.as_ref()) > REFRESH_MARGIN_SECS {
            return Ok(Some(session));
        }
        match self.refresh_session().await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(crate::Error::Backend(e)) if e.is_rejected() => {
                warn!(user_id = %session.user_id, error = %e, "Refresh token rejected, dropping session");
                self.clear_local();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.bus.subscribe(Some(AuthEvent::initial(self.current())))
    }

    async fn establish_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session> {
        let user = self.fetch_user(access_token).await?;
        let now = self.clock.now_secs();
        let expires_at = jwt_expiry(access_token).unwrap_or(now + FALLBACK_TTL_SECS);
        let session = Session::new(
            user.id,
            Credentials::new(access_token, refresh_token),
            expires_at,
            user.email,
        );
        info!(user_id = %session.user_id, "Established session from redirect tokens");
        self.install(session.clone());
        self.bus.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.current() else {
            self.clear_local();
            return Ok(());
        };
        let result = self
            .client
            .post(self.url("logout"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(session.access_token())
            .send()
            .await;

        // The local session is dropped regardless of what the server says
        self.clear_local();
        info!(user_id = %session.user_id, "Signed out");

        let response = result.map_err(transport_error)?;
        if !response.status().is_success() && response.status().as_u16() != 401 {
            return Err(error_from_response(response).await.into());
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_grant(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        info!(user_id = %session.user_id, "Signed in with password");
        self.install(session.clone());
        self.bus.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .post(self.url("recover"))
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        let session = self.current().ok_or(BackendError::NoSession)?;
        let response = self
            .client
            .put(self.url("user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(session.access_token())
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        self.bus.emit(AuthEvent::user_updated(session));
        Ok(())
    }
}
