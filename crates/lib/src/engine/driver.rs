//! The engine task.
//!
//! [`EngineDriver`] owns the state machine and is the only writer of engine
//! state. It multiplexes three inputs on one task: backend events, finished
//! profile resolutions, and commands from [`SessionEngine`](super::SessionEngine)
//! handles. Backend events are polled first, so a command always observes
//! every event the backend emitted before the command was sent.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{Instrument, Span, debug, debug_span, info, info_span, trace, warn};

use super::{
    errors::EngineError,
    machine::{Effect, ResolutionDone, SessionMachine},
    state::{EngineNotice, EnginePhase},
};
use crate::{
    backend::{AuthBackend, AuthEvent, AuthSubscription},
    resolver::ProfileResolver,
    router::{EventRouter, Routed},
    types::{DerivedIdentity, Session},
};

/// Requests from engine handles to the engine task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Clear local state as if the backend had signed out
    SignOutLocal { reply: oneshot::Sender<()> },
    /// Answer once the identity of `user_id` has settled
    AwaitSettled {
        user_id: String,
        reply: oneshot::Sender<Result<DerivedIdentity, EngineError>>,
    },
    /// Revalidate the current profile and answer with the result
    Refresh {
        reply: oneshot::Sender<Result<DerivedIdentity, EngineError>>,
    },
    Unmount { reply: oneshot::Sender<()> },
}

/// Channels the driver publishes on.
pub(crate) struct Outputs {
    pub identity: watch::Sender<DerivedIdentity>,
    pub session: watch::Sender<Option<Session>>,
    pub phase: watch::Sender<EnginePhase>,
    pub initialized: watch::Sender<bool>,
    pub notices: broadcast::Sender<EngineNotice>,
}

#[derive(Debug)]
struct Waiter {
    user_id: String,
    reply: oneshot::Sender<Result<DerivedIdentity, EngineError>>,
}

enum Flow {
    Continue,
    Stop,
}

enum InitOutcome {
    /// Initialized; replay these commands that arrived meanwhile
    Ready(Vec<Command>),
    Unmount(Option<oneshot::Sender<()>>),
}

pub(crate) struct EngineDriver {
    auth: Arc<dyn AuthBackend>,
    resolver: ProfileResolver,
    machine: SessionMachine,
    router: EventRouter,
    command_rx: mpsc::Receiver<Command>,
    resolution_tx: mpsc::UnboundedSender<ResolutionDone>,
    resolution_rx: mpsc::UnboundedReceiver<ResolutionDone>,
    waiters: Vec<Waiter>,
    out: Outputs,
}

impl EngineDriver {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        resolver: ProfileResolver,
        machine: SessionMachine,
        command_rx: mpsc::Receiver<Command>,
        out: Outputs,
    ) -> Self {
        let (resolution_tx, resolution_rx) = mpsc::unbounded_channel();
        Self {
            auth,
            resolver,
            machine,
            router: EventRouter::new(),
            command_rx,
            resolution_tx,
            resolution_rx,
            waiters: Vec::new(),
            out,
        }
    }

    /// Run until unmounted or every handle is dropped.
    pub async fn run(mut self) {
        async move {
            info!("Mounting session engine");
            let mut events = self.auth.subscribe();

            let deferred = match self.initialize(&mut events).await {
                InitOutcome::Ready(deferred) => deferred,
                InitOutcome::Unmount(reply) => {
                    self.shutdown();
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return;
                }
            };
            for command in deferred {
                if let Flow::Stop = self.handle_command(command) {
                    return;
                }
            }

            let mut events_open = true;
            loop {
                tokio::select! {
                    biased;

                    event = events.recv(), if events_open => match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!("Auth event stream closed");
                            events_open = false;
                        }
                    },

                    Some(done) = self.resolution_rx.recv() => {
                        let effects = self.machine.apply_resolution(done);
                        self.apply(effects);
                    }

                    command = self.command_rx.recv() => match command {
                        Some(command) => {
                            if let Flow::Stop = self.handle_command(command) {
                                break;
                            }
                        }
                        None => {
                            debug!("All engine handles dropped");
                            self.shutdown();
                            break;
                        }
                    },
                }
            }
        }
        .instrument(info_span!("session_engine"))
        .await
    }

    /// Take the current-session snapshot while the router holds back events.
    async fn initialize(&mut self, events: &mut AuthSubscription) -> InitOutcome {
        self.router.begin_initialization();
        self.machine.begin_initialization();
        self.publish();

        let auth = self.auth.clone();
        let lookup = auth.get_current_session();
        tokio::pin!(lookup);

        let mut deferred = Vec::new();
        let mut events_open = true;
        let result = loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    None => return InitOutcome::Unmount(None),
                    Some(Command::Unmount { reply }) => return InitOutcome::Unmount(Some(reply)),
                    Some(command) => deferred.push(command),
                },

                result = &mut lookup => break result,

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.router.route(&event);
                    }
                    None => events_open = false,
                },
            }
        };

        let (session, lookup_error) = match result {
            Ok(session) => (session, None),
            Err(e) => match self.router.captured_snapshot() {
                Some(captured) => {
                    warn!(error = %e, "Session lookup failed, using the stream's snapshot");
                    (captured.session.clone(), None)
                }
                None => {
                    warn!(error = %e, "Session lookup failed");
                    (None, Some(e.to_string()))
                }
            },
        };

        let snapshot = AuthEvent::initial(session.clone());
        if let Some(captured) = self.router.finish_initialization(&snapshot)
            && captured.subject() != snapshot.subject()
        {
            debug!(
                captured = captured.subject().unwrap_or("none"),
                "Stream snapshot differs from the looked-up session"
            );
        }
        let effects = self.machine.apply_initial(session, lookup_error);
        self.apply(effects);
        InitOutcome::Ready(deferred)
    }

    fn handle_event(&mut self, event: AuthEvent) {
        match self.router.route(&event) {
            Routed::Forward => {
                debug!(kind = %event.kind, subject = event.subject().unwrap_or("none"), "Handling auth event");
                let effects = self.machine.apply_event(event);
                self.apply(effects);
            }
            Routed::Dropped(reason) => {
                trace!(kind = %event.kind, ?reason, "Dropped auth event");
                self.machine.observe_session(&event);
                self.publish();
                self.settle_waiters();
            }
            Routed::Captured => {}
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::SignOutLocal { reply } => {
                self.router.note_local_sign_out();
                let effects = self.machine.sign_out_local();
                self.apply(effects);
                let _ = reply.send(());
            }
            Command::AwaitSettled { user_id, reply } => {
                self.waiters.push(Waiter { user_id, reply });
                self.settle_waiters();
            }
            Command::Refresh { reply } => match self.machine.refresh() {
                Ok((user_id, effects)) => {
                    self.waiters.push(Waiter { user_id, reply });
                    self.apply(effects);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Unmount { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Publish the machine's state, then carry out its effects.
    fn apply(&mut self, effects: Vec<Effect>) {
        self.publish();
        for effect in effects {
            match effect {
                Effect::Resolve {
                    user_id,
                    mode,
                    guard,
                } => {
                    let resolver = self.resolver.clone();
                    let done = self.resolution_tx.clone();
                    let span = debug_span!("resolve_profile", user_id = %user_id);
                    tokio::spawn(
                        async move {
                            let result = resolver.resolve(&user_id, mode).await;
                            // The engine may be gone by now
                            let _ = done.send(ResolutionDone {
                                user_id,
                                guard,
                                result,
                            });
                        }
                        .instrument(span),
                    );
                }
                Effect::ForceSignOut { user_id } => {
                    // The machine is already anonymous; the revocation echo is not news
                    self.router.note_local_sign_out();
                    let auth = self.auth.clone();
                    tokio::spawn(
                        async move {
                            if let Err(e) = auth.sign_out().await {
                                warn!(user_id = %user_id, error = %e, "Failed to revoke session");
                            }
                        }
                        .instrument(Span::current()),
                    );
                }
                Effect::Notify(notice) => {
                    // Nobody listening is fine
                    let _ = self.out.notices.send(notice);
                }
            }
        }
        self.settle_waiters();
    }

    /// Push the machine's state to every watch channel that changed.
    fn publish(&mut self) {
        let identity = self.machine.identity().clone();
        let settled = !identity.loading && self.machine.phase().is_ready();
        let changed = self.out.identity.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
        if changed {
            trace!(identity = ?self.machine.identity(), "Published identity");
        }

        let session = self.machine.session().cloned();
        self.out.session.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });

        let phase = self.machine.phase();
        self.out.phase.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });

        if settled {
            self.out.initialized.send_if_modified(|initialized| {
                let first = !*initialized;
                *initialized = true;
                first
            });
        }
    }

    fn settle_waiters(&mut self) {
        if self.waiters.is_empty() {
            return;
        }
        for waiter in std::mem::take(&mut self.waiters) {
            if waiter.reply.is_closed() {
                continue;
            }
            match self.machine.settlement(&waiter.user_id) {
                Some(outcome) => {
                    let _ = waiter.reply.send(outcome);
                }
                None => self.waiters.push(waiter),
            }
        }
    }

    fn shutdown(&mut self) {
        if self.machine.phase() == EnginePhase::Unmounted {
            return;
        }
        self.machine.unmount();
        self.publish();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.reply.send(Err(EngineError::Unmounted));
        }
        info!("Session engine unmounted");
    }
}
