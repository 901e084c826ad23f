//! Filtering and sequencing of backend lifecycle events.
//!
//! The router is a pure filter owned by the engine task. It never awaits, so
//! the engine handles one routed event to completion before asking for the
//! next verdict.

use std::fmt;

use tracing::trace;

use crate::backend::{AuthEvent, AuthEventKind};

/// Key used to suppress an immediately repeated identical event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    kind: AuthEventKind,
    subject: String,
}

impl DedupKey {
    pub fn of(event: &AuthEvent) -> Self {
        Self::new(event.kind.clone(), event.subject())
    }

    pub fn new(kind: AuthEventKind, subject: Option<&str>) -> Self {
        Self {
            kind,
            subject: subject.unwrap_or("none").to_string(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.subject)
    }
}

/// Why an event was not forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Arrived while the initial session snapshot was being taken.
    Initializing,
    /// Same key as the previous accepted event.
    Duplicate,
    /// Not a lifecycle kind the engine acts on.
    Irrelevant,
}

/// Verdict for one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    Forward,
    /// Kept aside as the initialization snapshot.
    Captured,
    Dropped(DropReason),
}

/// Deduplicating filter in front of the engine.
#[derive(Debug, Default)]
pub struct EventRouter {
    initializing: bool,
    captured: Option<AuthEvent>,
    last_key: Option<DedupKey>,
    initial_accepted: bool,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the initialization phase. Events are dropped until
    /// [`finish_initialization`](Self::finish_initialization), except the
    /// first initial snapshot, which is captured.
    pub fn begin_initialization(&mut self) {
        self.initializing = true;
        self.captured = None;
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// The snapshot captured during initialization, if any.
    pub fn captured_snapshot(&self) -> Option<&AuthEvent> {
        self.captured.as_ref()
    }

    /// Leave the initialization phase with `snapshot` as the accepted initial
    /// event. Returns the snapshot captured from the stream, if one arrived.
    pub fn finish_initialization(&mut self, snapshot: &AuthEvent) -> Option<AuthEvent> {
        self.initializing = false;
        self.initial_accepted = true;
        self.last_key = Some(DedupKey::of(snapshot));
        self.captured.take()
    }

    /// Record a locally initiated sign-out as the last accepted event, so the
    /// backend's echo of it is dropped as a duplicate.
    pub fn note_local_sign_out(&mut self) {
        self.last_key = Some(DedupKey::new(AuthEventKind::SignedOut, None));
    }

    /// Decide what to do with `event`.
    pub fn route(&mut self, event: &AuthEvent) -> Routed {
        let verdict = self.verdict(event);
        trace!(kind = %event.kind, subject = event.subject().unwrap_or("none"), ?verdict, "Routed auth event");
        verdict
    }

    fn verdict(&mut self, event: &AuthEvent) -> Routed {
        if !event.kind.is_lifecycle() {
            return Routed::Dropped(DropReason::Irrelevant);
        }

        if self.initializing {
            if event.kind == AuthEventKind::InitialSession && self.captured.is_none() {
                self.captured = Some(event.clone());
                return Routed::Captured;
            }
            return Routed::Dropped(DropReason::Initializing);
        }

        let key = DedupKey::of(event);
        if event.kind == AuthEventKind::InitialSession && !self.initial_accepted {
            self.initial_accepted = true;
            self.last_key = Some(key);
            return Routed::Forward;
        }
        if self.last_key.as_ref() == Some(&key) {
            return Routed::Dropped(DropReason::Duplicate);
        }
        self.last_key = Some(key);
        Routed::Forward
    }
}
