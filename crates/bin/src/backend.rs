//! Backend creation and session persistence between invocations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fitsync::{
    EngineConfig, Session, SessionEngine,
    backend::{HttpAuthBackend, HttpBackendConfig, HttpProfileStore},
    cache::{FileStore, KeyValueStore},
};

use crate::cli::BackendArgs;

const PROFILE_CACHE_FILE: &str = "profiles.json";
const SESSION_FILE: &str = "session.json";
const SESSION_KEY: &str = "fitsync:session";

/// A mounted engine plus the store its session is saved to on exit.
pub struct Connection {
    pub engine: SessionEngine,
    sessions: FileStore,
}

impl Connection {
    /// Save the engine's current session (or forget it) and unmount.
    pub async fn close(self) -> Result<(), Box<dyn std::error::Error>> {
        match self.engine.session() {
            Some(session) => {
                self.sessions
                    .set(SESSION_KEY, serde_json::to_string(&session)?)?;
                tracing::debug!(user_id = %session.user_id, "Saved session");
            }
            None => self.sessions.remove(SESSION_KEY)?,
        }
        self.engine.unmount().await?;
        Ok(())
    }
}

/// Build the HTTP adapters, restore any saved session and mount the engine.
pub async fn connect(args: &BackendArgs) -> Result<Connection, Box<dyn std::error::Error>> {
    let data_dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    let mut config = HttpBackendConfig::new(&args.auth_url, &args.rest_url, &args.api_key);
    config.profile_table = args.profile_table.clone();
    tracing::info!(auth_url = %redact_url(&args.auth_url), "Using HTTP auth backend");

    let auth = Arc::new(HttpAuthBackend::new(config.clone())?);
    let sessions = FileStore::open(data_dir.join(SESSION_FILE))?;
    if let Some(saved) = sessions.get(SESSION_KEY)? {
        match serde_json::from_str::<Session>(&saved) {
            Ok(session) => {
                tracing::debug!(user_id = %session.user_id, "Restoring saved session");
                auth.restore_session(session);
            }
            Err(e) => tracing::warn!("Ignoring unreadable saved session: {e}"),
        }
    }

    let profiles = Arc::new(HttpProfileStore::new(config)?.with_auth(auth.clone()));
    let cache = Arc::new(FileStore::open(data_dir.join(PROFILE_CACHE_FILE))?);
    let engine_config = EngineConfig::default()
        .with_sign_in_timeout(Duration::from_millis(args.sign_in_timeout_ms));

    let engine = SessionEngine::mount(auth, profiles, cache, engine_config)?;
    Ok(Connection { engine, sessions })
}

/// Strip userinfo and query from a URL for safe logging
pub fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => "<unparsable-url>".to_string(),
    }
}
