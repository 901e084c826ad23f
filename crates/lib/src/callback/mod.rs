//! One-shot handling of authentication redirects.
//!
//! Email verification, magic-link and recovery emails land the user on a
//! callback URL carrying a token pair. [`CallbackHandler::handle`] turns that
//! URL into a session, or into a well-defined failure, and always returns:
//!
//! * a complete token pair is exchanged with the backend;
//! * a half pair or a provider error fails at once;
//! * no pair at all means the backend may already have consumed the
//!   redirect, so the current session is polled once and the event stream is
//!   watched for a late `SIGNED_IN`;
//! * an absolute timeout bounds all of the above.
//!
//! The engine picks up the resulting session from its own event stream.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    backend::{AuthBackend, AuthEvent, AuthEventKind, AuthSubscription},
    engine::{EnginePhase, SessionEngine},
    types::Session,
};

mod config;
pub mod errors;
mod params;

pub use config::CallbackConfig;
pub use errors::CallbackError;
pub use params::{FlowType, RedirectParams, sanitize};

/// How a session came about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackSuccess {
    /// The redirect's token pair was exchanged for a session.
    Established {
        session: Session,
        flow: Option<FlowType>,
    },
    /// The backend already held a session.
    Existing { session: Session },
    /// A session arrived on the event stream while waiting.
    SignedInByEvent { session: Session },
}

impl CallbackSuccess {
    pub fn session(&self) -> &Session {
        match self {
            CallbackSuccess::Established { session, .. }
            | CallbackSuccess::Existing { session }
            | CallbackSuccess::SignedInByEvent { session } => session,
        }
    }
}

/// Everything the caller needs to leave the callback page.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub result: Result<CallbackSuccess, CallbackError>,
    /// The callback URL with every sensitive parameter removed
    pub sanitized_url: String,
    /// Where to navigate next; `None` when the flow was cancelled
    pub destination: Option<String>,
    pub elapsed: Duration,
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn session(&self) -> Option<&Session> {
        self.result.as_ref().ok().map(CallbackSuccess::session)
    }
}

/// Runs the redirect callback flow against an authentication backend.
pub struct CallbackHandler {
    auth: Arc<dyn AuthBackend>,
    config: CallbackConfig,
    engine_phase: Option<watch::Receiver<EnginePhase>>,
}

impl std::fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("config", &self.config)
            .field("bound_to_engine", &self.engine_phase.is_some())
            .finish()
    }
}

impl CallbackHandler {
    pub fn new(auth: Arc<dyn AuthBackend>, config: CallbackConfig) -> Self {
        Self {
            auth,
            config,
            engine_phase: None,
        }
    }

    /// A handler bound to `engine`: it uses the engine's backend and is
    /// cancelled when the engine unmounts.
    pub fn for_engine(engine: &SessionEngine, config: CallbackConfig) -> Self {
        Self {
            auth: engine.auth(),
            config,
            engine_phase: Some(engine.watch_phase()),
        }
    }

    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Handle the callback page entered at `location`.
    pub async fn handle(&self, location: &str) -> CallbackOutcome {
        let started = Instant::now();
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Callback location is not a URL");
                return self.finish(
                    Err(CallbackError::malformed(format!("not a URL: {e}"))),
                    String::new(),
                    started,
                );
            }
        };
        let sanitized_url = sanitize(&url).to_string();
        let params = RedirectParams::from_url(&url);
        debug!(?params, "Handling auth callback");

        // Subscribe before polling so a SIGNED_IN between the two is not lost
        let mut events = self.auth.subscribe();
        let timeout = self.config.timeout();

        let result = tokio::select! {
            biased;
            _ = engine_stopped(self.engine_phase.clone()) => Err(CallbackError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(CallbackError::RedirectTimeout {
                timeout_ms: self.config.timeout_ms,
            }),
            result = self.run_flow(&params, &mut events) => result,
        };
        self.finish(result, sanitized_url, started)
    }

    async fn run_flow(
        &self,
        params: &RedirectParams,
        events: &mut AuthSubscription,
    ) -> Result<CallbackSuccess, CallbackError> {
        if let Some((access_token, refresh_token)) = params.credentials()? {
            info!(flow = ?params.flow, "Establishing session from redirect credentials");
            let session = self
                .auth
                .establish_session(access_token, refresh_token)
                .await
                .map_err(|e| CallbackError::EstablishFailed {
                    reason: e.to_string(),
                })?;
            return Ok(CallbackSuccess::Established {
                session,
                flow: params.flow,
            });
        }

        match self.auth.get_current_session().await {
            Ok(Some(session)) => return Ok(CallbackSuccess::Existing { session }),
            Ok(None) => debug!("No session yet, waiting for the backend"),
            Err(e) => warn!(error = %e, "Session lookup failed, waiting for the backend"),
        }
        wait_for_session(events).await
    }

    fn finish(
        &self,
        result: Result<CallbackSuccess, CallbackError>,
        sanitized_url: String,
        started: Instant,
    ) -> CallbackOutcome {
        let elapsed = started.elapsed();
        let destination = match &result {
            Ok(CallbackSuccess::Established {
                flow: Some(FlowType::Recovery),
                ..
            }) => Some(self.config.recovery_path.clone()),
            Ok(_) => Some(self.config.home_path.clone()),
            Err(CallbackError::Cancelled) => None,
            Err(_) => Some(self.config.sign_in_path.clone()),
        };
        match &result {
            Ok(success) => info!(
                user_id = %success.session().user_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Auth callback completed"
            ),
            Err(e) => warn!(
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Auth callback failed"
            ),
        }
        CallbackOutcome {
            result,
            sanitized_url,
            destination,
            elapsed,
        }
    }
}

/// Wait on the event stream until it settles the flow either way.
async fn wait_for_session(events: &mut AuthSubscription) -> Result<CallbackSuccess, CallbackError> {
    while let Some(AuthEvent { kind, session }) = events.recv().await {
        match (kind, session) {
            (AuthEventKind::InitialSession, Some(session)) => {
                return Ok(CallbackSuccess::Existing { session });
            }
            (AuthEventKind::SignedIn, Some(session)) => {
                return Ok(CallbackSuccess::SignedInByEvent { session });
            }
            (AuthEventKind::SignedOut, _) => return Err(CallbackError::SignedOut),
            _ => {}
        }
    }
    // The stream is gone; only the timeout can end the flow now
    std::future::pending().await
}

async fn engine_stopped(phase: Option<watch::Receiver<EnginePhase>>) {
    match phase {
        Some(mut phase) => {
            // A closed channel means the engine task is gone, which counts too
            let _ = phase.wait_for(|p| *p == EnginePhase::Unmounted).await;
        }
        None => std::future::pending().await,
    }
}
