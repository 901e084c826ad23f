//! In-process authentication backend and profile store.
//!
//! Both types keep everything in memory and expose knobs to simulate the
//! conditions the engine must survive: outages, slow responses and requests
//! held in flight until released. They back the test suite and the
//! documentation examples.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AuthBackend, AuthEvent, AuthSubscription, BackendError, EventBus, ProfileStore};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    types::{Credentials, Profile, Session},
};

/// Lifetime of sessions issued by [`InMemoryAuthBackend`].
const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

#[derive(Clone, Debug)]
struct Account {
    user_id: String,
    password: String,
}

/// Token pair handed out for a redirect that has not been consumed yet.
#[derive(Clone, Debug)]
struct PendingTokens {
    user_id: String,
    refresh_token: String,
}

/// Authentication backend held entirely in memory.
#[derive(Debug)]
pub struct InMemoryAuthBackend {
    accounts: Mutex<HashMap<String, Account>>,
    pending: Mutex<HashMap<String, PendingTokens>>,
    session: Mutex<Option<Session>>,
    password_resets: Mutex<Vec<String>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    session_delay: Mutex<Duration>,
    session_lookups: AtomicUsize,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            password_resets: Mutex::new(Vec::new()),
            bus: EventBus::default(),
            clock,
            offline: AtomicBool::new(false),
            session_delay: Mutex::new(Duration::ZERO),
            session_lookups: AtomicUsize::new(0),
        }
    }

    /// Register a password account.
    pub fn add_account(&self, email: &str, password: &str, user_id: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                user_id: user_id.to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Mint a fresh session for `user_id` without emitting anything.
    pub fn issue_session(&self, user_id: &str) -> Session {
        let email = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, account)| account.user_id == user_id)
            .map(|(email, _)| email.clone());
        Session::new(
            user_id,
            Credentials::new(
                format!("access-{}", Uuid::new_v4()),
                format!("refresh-{}", Uuid::new_v4()),
            ),
            self.clock.now_secs() + DEFAULT_SESSION_TTL_SECS,
            email,
        )
    }

    /// Mint a token pair as a verification email would carry it.
    ///
    /// The pair becomes a session once passed to
    /// [`establish_session`](AuthBackend::establish_session).
    pub fn issue_redirect_tokens(&self, user_id: &str) -> (String, String) {
        let access = format!("access-{}", Uuid::new_v4());
        let refresh = format!("refresh-{}", Uuid::new_v4());
        self.pending.lock().unwrap().insert(
            access.clone(),
            PendingTokens {
                user_id: user_id.to_string(),
                refresh_token: refresh.clone(),
            },
        );
        (access, refresh)
    }

    /// Install a session for `user_id` and announce it with `SIGNED_IN`.
    pub fn sign_in_as(&self, user_id: &str) -> Session {
        let session = self.issue_session(user_id);
        self.install(session.clone());
        self.bus.emit(AuthEvent::signed_in(session.clone()));
        session
    }

    /// Install a session silently, as if restored from storage before page load.
    pub fn restore_session(&self, session: Session) {
        self.install(session);
    }

    /// Rotate the current session's tokens and announce `TOKEN_REFRESHED`.
    pub fn refresh(&self) -> Result<Session> {
        self.ensure_online()?;
        let user_id = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or(BackendError::NoSession)?;
        let session = self.issue_session(&user_id);
        self.install(session.clone());
        self.bus.emit(AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    /// Emit an arbitrary event, including kinds the engine ignores.
    pub fn emit(&self, event: AuthEvent) {
        self.bus.emit(event);
    }

    /// Simulate the backend being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every `get_current_session` answer by `delay`.
    pub fn set_session_delay(&self, delay: Duration) {
        *self.session_delay.lock().unwrap() = delay;
    }

    /// How many times `get_current_session` was called.
    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    /// Emails for which a password reset was requested.
    pub fn password_resets(&self) -> Vec<String> {
        self.password_resets.lock().unwrap().clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    fn install(&self, session: Session) {
        debug!(user_id = %session.user_id, "Installing session");
        *self.session.lock().unwrap() = Some(session);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::transport("auth backend offline").into());
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn get_current_session(&self) -> Result<Option<Session>> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.session_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ensure_online()?;
        Ok(self.current_session())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.bus
            .subscribe(Some(AuthEvent::initial(self.current_session())))
    }

    async fn establish_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session> {
        self.ensure_online()?;
        let pending = self.pending.lock().unwrap().remove(access_token);
        let pending = match pending {
            Some(p) if p.refresh_token == refresh_token => p,
            _ => {
                return Err(BackendError::InvalidCredentials {
                    reason: "unknown or expired token pair".to_string(),
                }
                .into());
            }
        };
        let session = Session::new(
            pending.user_id,
            Credentials::new(access_token, refresh_token),
            self.clock.now_secs() + DEFAULT_SESSION_TTL_SECS,
            None,
        );
        self.install(session.clone());
        self.bus.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.ensure_online()?;
        let previous = self.session.lock().unwrap().take();
        if let Some(previous) = previous {
            info!(user_id = %previous.user_id, "Signed out");
        }
        self.bus.emit(AuthEvent::signed_out());
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.ensure_online()?;
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some(account) if account.password == password => Ok(self.sign_in_as(&account.user_id)),
            _ => Err(BackendError::InvalidCredentials {
                reason: "invalid login credentials".to_string(),
            }
            .into()),
        }
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<()> {
        self.ensure_online()?;
        self.password_resets.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        self.ensure_online()?;
        let session = self.current_session().ok_or(BackendError::NoSession)?;
        for account in self.accounts.lock().unwrap().values_mut() {
            if account.user_id == session.user_id {
                account.password = new_password.to_string();
            }
        }
        self.bus.emit(AuthEvent::user_updated(session));
        Ok(())
    }
}

/// Profile store held entirely in memory.
#[derive(Debug)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
    offline: AtomicBool,
    paused: watch::Sender<bool>,
    latency: Mutex<Duration>,
    fetches: AtomicUsize,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            profiles: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            paused,
            latency: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a profile row.
    pub fn insert(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile);
    }

    pub fn remove(&self, user_id: &str) {
        self.profiles.lock().unwrap().remove(user_id);
    }

    /// Simulate the store being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Add a fixed delay to every fetch.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Hold every fetch (including ones already waiting) until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut paused = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel
        let _ = paused.wait_for(|held| !*held).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::transport("profile store offline").into());
        }
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }
}
