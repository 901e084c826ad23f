//! A small in-process stand-in for the GoTrue and PostgREST endpoints.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use fitsync::backend::HttpBackendConfig;
use serde_json::{Value, json};

pub const API_KEY: &str = "anon-key";

#[derive(Default)]
pub struct MockState {
    /// email -> (password, user id)
    accounts: Mutex<HashMap<String, (String, String)>>,
    /// user id -> profile row
    profiles: Mutex<HashMap<String, Value>>,
    /// access token -> user id
    tokens: Mutex<HashMap<String, String>>,
    /// refresh token -> user id
    refresh_tokens: Mutex<HashMap<String, String>>,
    issued: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub logouts: AtomicUsize,
    pub recoveries: Mutex<Vec<(String, Option<String>)>>,
    pub profile_bearers: Mutex<Vec<String>>,
    pub password_updates: AtomicUsize,
    pub fail_profiles: Mutex<bool>,
}

impl MockState {
    pub fn add_account(&self, email: &str, password: &str, user_id: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            (password.to_string(), user_id.to_string()),
        );
    }

    pub fn add_profile(&self, user_id: &str, role: &str) {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            json!({
                "id": user_id,
                "first_name": "Robin",
                "last_name": "Vale",
                "role": role,
                "trainer_id": null,
            }),
        );
    }

    /// Mint a token pair for `user_id` as an emailed link would carry it.
    pub fn issue_tokens(&self, user_id: &str) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        self.tokens
            .lock()
            .unwrap()
            .insert(access.clone(), user_id.to_string());
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh.clone(), user_id.to_string());
        (access, refresh)
    }

    fn email_of(&self, user_id: &str) -> Option<String> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (_, id))| id == user_id)
            .map(|(email, _)| email.clone())
    }

    fn token_body(&self, user_id: &str) -> Value {
        let (access, refresh) = self.issue_tokens(user_id);
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
            "expires_in": 3600,
            "user": { "id": user_id, "email": self.email_of(user_id) },
        })
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer(headers)?;
        self.tokens.lock().unwrap().get(&token).cloned()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error_description": message })))
}

async fn token(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match params.get("grant_type").map(String::as_str) {
        Some("password") => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            let account = state.accounts.lock().unwrap().get(email).cloned();
            match account {
                Some((expected, user_id)) if expected == password => {
                    (StatusCode::OK, Json(state.token_body(&user_id)))
                }
                _ => error(StatusCode::BAD_REQUEST, "Invalid login credentials"),
            }
        }
        Some("refresh_token") => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            let user_id = state.refresh_tokens.lock().unwrap().remove(refresh);
            match user_id {
                Some(user_id) => {
                    state.refreshes.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, Json(state.token_body(&user_id)))
                }
                None => error(StatusCode::BAD_REQUEST, "Invalid Refresh Token"),
            }
        }
        _ => error(StatusCode::BAD_REQUEST, "unsupported grant_type"),
    }
}

async fn get_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    match state.user_for(&headers) {
        Some(user_id) => (
            StatusCode::OK,
            Json(json!({ "id": user_id, "email": state.email_of(&user_id) })),
        ),
        None => error(StatusCode::UNAUTHORIZED, "invalid JWT"),
    }
}

async fn put_user(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(user_id) = state.user_for(&headers) else {
        return error(StatusCode::UNAUTHORIZED, "invalid JWT");
    };
    if body.get("password").and_then(Value::as_str).is_none() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "password required");
    }
    state.password_updates.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({ "id": user_id })))
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer(&headers) {
        state.tokens.lock().unwrap().remove(&token);
    }
    state.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn recover(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    state
        .recoveries
        .lock()
        .unwrap()
        .push((email, params.get("redirect_to").cloned()));
    (StatusCode::OK, Json(json!({})))
}

async fn profiles(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return error(StatusCode::UNAUTHORIZED, "missing apikey");
    }
    if let Some(token) = bearer(&headers) {
        state.profile_bearers.lock().unwrap().push(token);
    }
    if *state.fail_profiles.lock().unwrap() {
        return error(StatusCode::SERVICE_UNAVAILABLE, "database is restarting");
    }
    let user_id = params
        .get("id")
        .and_then(|filter| filter.strip_prefix("eq."))
        .unwrap_or_default();
    let rows: Vec<Value> = state
        .profiles
        .lock()
        .unwrap()
        .get(user_id)
        .cloned()
        .into_iter()
        .collect();
    (StatusCode::OK, Json(Value::Array(rows)))
}

/// A running mock server.
pub struct MockServer {
    pub state: Arc<MockState>,
    pub base: String,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(get_user).put(put_user))
            .route("/auth/v1/logout", post(logout))
            .route("/auth/v1/recover", post(recover))
            .route("/rest/v1/profiles", get(profiles))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base: format!("http://{addr}"),
        }
    }

    pub fn config(&self) -> HttpBackendConfig {
        HttpBackendConfig::new(
            format!("{}/auth/v1", self.base),
            format!("{}/rest/v1", self.base),
            API_KEY,
        )
    }
}
