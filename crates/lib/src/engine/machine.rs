//! The engine's state machine.
//!
//! [`SessionMachine`] owns the authoritative state and decides every
//! transition. It performs no network I/O: anything that has to reach a
//! remote system is returned as an [`Effect`] for the driver to carry out,
//! and the outcome comes back as another input. This keeps each transition
//! synchronous, so one event is always handled to completion before the
//! next is looked at.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::{
    errors::EngineError,
    state::{EngineNotice, EnginePhase},
};
use crate::{
    backend::{AuthEvent, AuthEventKind},
    cache::SessionCache,
    constants::INVALID_ACCOUNT_MESSAGE,
    resolver::{Resolution, ResolutionSource, ResolveError, ResolveMode},
    tracker::{RequestGuard, RequestTracker},
    types::{CurrentUser, DerivedIdentity, Profile, Session},
};

/// Work the driver must perform on the machine's behalf.
#[derive(Debug)]
pub(crate) enum Effect {
    /// Resolve a profile and feed the result back through
    /// [`SessionMachine::apply_resolution`].
    Resolve {
        user_id: String,
        mode: ResolveMode,
        guard: RequestGuard,
    },
    /// Revoke the backend session of a user without a profile.
    ForceSignOut { user_id: String },
    Notify(EngineNotice),
}

/// A finished profile resolution on its way back into the machine.
#[derive(Debug)]
pub(crate) struct ResolutionDone {
    pub user_id: String,
    pub guard: RequestGuard,
    pub result: Result<Resolution, ResolveError>,
}

#[derive(Debug)]
pub(crate) struct SessionMachine {
    phase: EnginePhase,
    session: Option<Session>,
    /// Profile of the session's subject, possibly tentative while revalidating
    profile: Option<Profile>,
    identity: DerivedIdentity,
    /// Subject of the snapshot taken at mount, until the next sign-out
    initial_subject: Option<String>,
    /// User id to the generation its resolution was started under
    pending: HashMap<String, u64>,
    /// Last user rejected for having no profile
    invalid_account: Option<String>,
    tracker: RequestTracker,
    cache: SessionCache,
}

impl SessionMachine {
    pub fn new(tracker: RequestTracker, cache: SessionCache) -> Self {
        Self {
            phase: EnginePhase::Uninitialized,
            session: None,
            profile: None,
            identity: DerivedIdentity::initializing(),
            initial_subject: None,
            pending: HashMap::new(),
            invalid_account: None,
            tracker,
            cache,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn identity(&self) -> &DerivedIdentity {
        &self.identity
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn subject(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Whether a resolution for `user_id` is outstanding in this generation.
    pub fn is_resolving(&self, user_id: &str) -> bool {
        self.pending.get(user_id) == Some(&self.tracker.generation())
    }

    pub fn begin_initialization(&mut self) {
        self.phase = EnginePhase::Initializing;
        self.identity = DerivedIdentity::initializing();
    }

    /// Apply the session snapshot taken at mount.
    ///
    /// `lookup_error` is recorded on the published identity when the
    /// snapshot could not be read and nothing else was known.
    pub fn apply_initial(
        &mut self,
        session: Option<Session>,
        lookup_error: Option<String>,
    ) -> Vec<Effect> {
        match session {
            None => {
                info!("No session at startup");
                self.phase = EnginePhase::Anonymous;
                self.identity = match lookup_error {
                    Some(error) => DerivedIdentity::anonymous().with_error(error),
                    None => DerivedIdentity::anonymous(),
                };
                Vec::new()
            }
            Some(session) => {
                info!(user_id = %session.user_id, "Restored session at startup");
                self.initial_subject = Some(session.user_id.clone());
                self.authenticate(session, ResolveMode::CacheFirst)
            }
        }
    }

    /// Apply an event the router forwarded.
    pub fn apply_event(&mut self, event: AuthEvent) -> Vec<Effect> {
        if self.phase == EnginePhase::Unmounted {
            return Vec::new();
        }
        let AuthEvent { kind, session } = event;
        match (kind, session) {
            (AuthEventKind::SignedOut, _) => self.sign_out_local(),
            (AuthEventKind::InitialSession, Some(session)) => {
                self.authenticate(session, ResolveMode::CacheFirst)
            }
            (AuthEventKind::InitialSession, None) => {
                self.reset_anonymous();
                Vec::new()
            }
            (AuthEventKind::SignedIn | AuthEventKind::UserUpdated, Some(session)) => {
                if self.is_stale_initial(&session) {
                    debug!(user_id = %session.user_id, "Event repeats the startup session, refreshing in place");
                    self.session = Some(session);
                    self.identity = self.derive(false);
                    return Vec::new();
                }
                self.authenticate(session, ResolveMode::Revalidate)
            }
            (AuthEventKind::TokenRefreshed, Some(session)) => self.token_refreshed(session),
            (kind, None) => {
                warn!(%kind, "Ignoring event without a session");
                Vec::new()
            }
            (AuthEventKind::Other(name), _) => {
                debug!(kind = %name, "Ignoring non-lifecycle event");
                Vec::new()
            }
        }
    }

    /// Take the tokens from an event the router dropped as a duplicate.
    ///
    /// A repeated refresh still carries the newest credentials even though
    /// nothing about the identity changed.
    pub fn observe_session(&mut self, event: &AuthEvent) {
        if let Some(session) = &event.session
            && event.kind != AuthEventKind::SignedOut
            && self.subject() == Some(session.user_id.as_str())
        {
            self.session = Some(session.clone());
        }
    }

    /// Sign out locally: drop the session, the cache and everything in flight.
    pub fn sign_out_local(&mut self) -> Vec<Effect> {
        let generation = self.tracker.cancel_all();
        self.pending.clear();
        let previous = self.session.take();
        self.profile = None;
        self.initial_subject = None;
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear profile cache on sign-out");
        }
        self.invalid_account = None;
        self.phase = EnginePhase::Anonymous;
        self.identity = DerivedIdentity::anonymous();

        match previous {
            Some(previous) => {
                info!(user_id = %previous.user_id, generation, "Signed out");
                vec![Effect::Notify(EngineNotice::SignedOut)]
            }
            None => Vec::new(),
        }
    }

    /// Revalidate the current user's profile in the background.
    pub fn refresh(&mut self) -> Result<(String, Vec<Effect>), EngineError> {
        if self.phase == EnginePhase::Unmounted {
            return Err(EngineError::Unmounted);
        }
        let user_id = self
            .subject()
            .map(str::to_string)
            .ok_or(EngineError::NotAuthenticated)?;
        let effects = self
            .start_resolution(&user_id, ResolveMode::Revalidate)
            .into_iter()
            .collect();
        Ok((user_id, effects))
    }

    /// Apply a finished resolution, unless it has been overtaken.
    pub fn apply_resolution(&mut self, done: ResolutionDone) -> Vec<Effect> {
        let ResolutionDone {
            user_id,
            guard,
            result,
        } = done;
        if self.pending.get(&user_id) == Some(&guard.generation()) {
            self.pending.remove(&user_id);
        }
        if !guard.is_live() {
            debug!(user_id = %user_id, generation = guard.generation(), "Discarding overtaken profile resolution");
            return Vec::new();
        }
        if self.subject() != Some(user_id.as_str()) {
            debug!(user_id = %user_id, "Discarding resolution for a user who is no longer signed in");
            return Vec::new();
        }

        match result {
            Ok(Resolution { profile, source }) => {
                let stale = matches!(source, ResolutionSource::StaleFallback { .. });
                let role = profile.role;
                info!(user_id = %user_id, %role, ?source, "Resolved profile");
                if source == ResolutionSource::Fresh
                    && let Err(e) = self.cache.put(&profile)
                {
                    warn!(user_id = %user_id, error = %e, "Failed to cache profile");
                }
                self.profile = Some(profile);
                self.identity = self.derive(false);
                vec![Effect::Notify(EngineNotice::ProfileResolved {
                    user_id,
                    role,
                    stale,
                })]
            }
            Err(ResolveError::ProfileNotFound { .. }) => {
                warn!(user_id = %user_id, "Authenticated user has no profile, revoking session");
                if let Err(e) = self.cache.invalidate(&user_id) {
                    warn!(user_id = %user_id, error = %e, "Failed to drop cached profile");
                }
                self.tracker.cancel_all();
                self.pending.clear();
                self.session = None;
                self.profile = None;
                self.initial_subject = None;
                self.invalid_account = Some(user_id.clone());
                self.phase = EnginePhase::Anonymous;
                self.identity = DerivedIdentity::anonymous().with_error(INVALID_ACCOUNT_MESSAGE);
                vec![
                    Effect::ForceSignOut {
                        user_id: user_id.clone(),
                    },
                    Effect::Notify(EngineNotice::InvalidAccount { user_id }),
                ]
            }
            Err(err) => {
                let reason = err.to_string();
                if let Some(known) = self.profile.as_ref().filter(|p| p.user_id == user_id) {
                    warn!(user_id = %user_id, error = %reason, "Profile revalidation failed, keeping known profile");
                    let role = known.role;
                    self.identity = self.derive(false);
                    return vec![Effect::Notify(EngineNotice::ProfileResolved {
                        user_id,
                        role,
                        stale: true,
                    })];
                }
                warn!(user_id = %user_id, error = %reason, "Profile unavailable, publishing bare identity");
                self.identity = self.derive(false).with_error(reason.clone());
                vec![Effect::Notify(EngineNotice::ResolutionFailed { user_id, reason })]
            }
        }
    }

    /// Where a sign-in for `user_id` stands.
    ///
    /// `None` while its identity is still being resolved.
    pub fn settlement(&self, user_id: &str) -> Option<Result<DerivedIdentity, EngineError>> {
        if self.phase == EnginePhase::Unmounted {
            return Some(Err(EngineError::Unmounted));
        }
        if self.is_resolving(user_id) {
            return None;
        }
        if self.identity.user_id() == Some(user_id) {
            if self.identity.loading {
                return None;
            }
            return Some(Ok(self.identity.clone()));
        }
        if self.invalid_account.as_deref() == Some(user_id) {
            return Some(Err(EngineError::InvalidAccount {
                user_id: user_id.to_string(),
            }));
        }
        Some(Err(EngineError::SignInInterrupted {
            user_id: user_id.to_string(),
        }))
    }

    pub fn unmount(&mut self) {
        self.phase = EnginePhase::Unmounted;
        self.pending.clear();
        self.tracker.unmount();
    }

    fn authenticate(&mut self, session: Session, mode: ResolveMode) -> Vec<Effect> {
        let user_id = session.user_id.clone();
        if self.subject().is_some_and(|current| current != user_id) {
            debug!(previous = ?self.subject(), user_id = %user_id, "Session subject changed");
            self.tracker.cancel_all();
            self.pending.clear();
        }
        if self.profile.as_ref().is_some_and(|p| p.user_id != user_id) {
            self.profile = None;
        }
        if self.profile.is_none() {
            self.profile = self.cache.get(&user_id);
        }
        if self.invalid_account.as_deref() == Some(user_id.as_str()) {
            self.invalid_account = None;
        }

        self.session = Some(session);
        self.phase = EnginePhase::Authenticated;
        self.identity = self.derive(true);
        self.start_resolution(&user_id, mode).into_iter().collect()
    }

    fn token_refreshed(&mut self, session: Session) -> Vec<Effect> {
        if self.subject() != Some(session.user_id.as_str()) {
            return self.authenticate(session, ResolveMode::CacheFirst);
        }
        let user_id = session.user_id.clone();
        self.session = Some(session);

        let known = self.profile.as_ref().is_some_and(|p| p.user_id == user_id);
        if !known && let Some(cached) = self.cache.get(&user_id) {
            self.profile = Some(cached);
        }
        if self.profile.is_some() || self.is_resolving(&user_id) {
            self.identity = self.derive(self.identity.loading);
            return Vec::new();
        }
        // Neither memory nor cache has it; fill it in without blocking
        self.identity = self.derive(false).with_loading(self.identity.loading);
        self.start_resolution(&user_id, ResolveMode::CacheFirst)
            .into_iter()
            .collect()
    }

    fn is_stale_initial(&self, session: &Session) -> bool {
        let user_id = session.user_id.as_str();
        self.initial_subject.as_deref() == Some(user_id)
            && self.subject() == Some(user_id)
            && self.profile.as_ref().is_some_and(|p| p.user_id == user_id)
            && !self.identity.loading
    }

    fn reset_anonymous(&mut self) {
        self.tracker.cancel_all();
        self.pending.clear();
        self.session = None;
        self.profile = None;
        self.phase = EnginePhase::Anonymous;
        self.identity = DerivedIdentity::anonymous();
    }

    fn start_resolution(&mut self, user_id: &str, mode: ResolveMode) -> Option<Effect> {
        if self.is_resolving(user_id) {
            debug!(user_id, "Profile resolution already in flight");
            return None;
        }
        let guard = self.tracker.register("profile");
        self.pending.insert(user_id.to_string(), guard.generation());
        debug!(user_id, ?mode, generation = guard.generation(), "Resolving profile");
        Some(Effect::Resolve {
            user_id: user_id.to_string(),
            mode,
            guard,
        })
    }

    fn derive(&self, loading: bool) -> DerivedIdentity {
        let Some(session) = &self.session else {
            return DerivedIdentity::anonymous();
        };
        let user = match &self.profile {
            Some(profile) if profile.user_id == session.user_id => {
                CurrentUser::merged(session, profile.clone())
            }
            _ => CurrentUser::bare(session),
        };
        DerivedIdentity::authenticated(user).with_loading(loading)
    }
}
