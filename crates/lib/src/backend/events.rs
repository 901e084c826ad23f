//! Authentication lifecycle events and their delivery.

use std::fmt;

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::Session;

/// Kind of lifecycle event emitted by the authentication backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthEventKind {
    /// Snapshot of the session delivered once to each new subscriber
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    /// Anything else the backend emits (password recovery, MFA, ...)
    Other(String),
}

impl AuthEventKind {
    /// Parse the wire name used by the backend (`SIGNED_IN`, ...).
    pub fn parse(name: &str) -> Self {
        match name {
            "INITIAL_SESSION" => AuthEventKind::InitialSession,
            "SIGNED_IN" => AuthEventKind::SignedIn,
            "SIGNED_OUT" => AuthEventKind::SignedOut,
            "TOKEN_REFRESHED" => AuthEventKind::TokenRefreshed,
            "USER_UPDATED" => AuthEventKind::UserUpdated,
            other => AuthEventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthEventKind::InitialSession => "INITIAL_SESSION",
            AuthEventKind::SignedIn => "SIGNED_IN",
            AuthEventKind::SignedOut => "SIGNED_OUT",
            AuthEventKind::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEventKind::UserUpdated => "USER_UPDATED",
            AuthEventKind::Other(name) => name,
        }
    }

    /// Whether the engine acts on this kind at all.
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, AuthEventKind::Other(_))
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(kind, session)` pair from the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn initial(session: Option<Session>) -> Self {
        Self::new(AuthEventKind::InitialSession, session)
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self::new(AuthEventKind::TokenRefreshed, Some(session))
    }

    pub fn user_updated(session: Session) -> Self {
        Self::new(AuthEventKind::UserUpdated, Some(session))
    }

    /// Subject of the carried session, if any.
    pub fn subject(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }
}

/// A live subscription to a backend's event stream.
///
/// The first [`recv`](Self::recv) yields the subscriber's initial snapshot
/// when the backend provides one. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct AuthSubscription {
    initial: Option<AuthEvent>,
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    pub fn new(initial: Option<AuthEvent>, rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self { initial, rx }
    }

    /// Wait for the next event. Returns `None` once the backend is gone.
    ///
    /// If this subscriber fell behind, the missed events are skipped with a
    /// warning; the engine re-derives state from the next event it sees.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Fan-out of backend events to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver `event` to all current subscribers.
    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    /// Subscribe, optionally queueing an initial snapshot for this subscriber only.
    pub fn subscribe(&self, initial: Option<AuthEvent>) -> AuthSubscription {
        AuthSubscription::new(initial, self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
