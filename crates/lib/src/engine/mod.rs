//! The session synchronization engine.
//!
//! A [`SessionEngine`] reconciles the authentication backend's event stream
//! with the profile store and publishes one [`DerivedIdentity`]: who the
//! current user is and whether they are privileged.
//!
//! Mounting spawns a single engine task that owns all state and handles one
//! input at a time. Handles are cheap to clone; they read published
//! snapshots and send commands to the task. Unmounting, or dropping every
//! handle, stops the task and discards any profile resolution still in
//! flight.
//!
//! ```
//! # use std::sync::Arc;
//! # use fitsync::backend::{InMemoryAuthBackend, InMemoryProfileStore};
//! # use fitsync::engine::SessionEngine;
//! # use fitsync::types::{DisplayName, Profile, Role};
//! # #[tokio::main]
//! # async fn main() -> fitsync::Result<()> {
//! let auth = Arc::new(InMemoryAuthBackend::new());
//! auth.add_account("coach@example.com", "secret", "u1");
//! let profiles = Arc::new(InMemoryProfileStore::new());
//! profiles.insert(Profile::new("u1", DisplayName::new("Casey", "Hart"), Role::Trainer));
//!
//! let engine = SessionEngine::builder(auth, profiles).mount()?;
//! engine.wait_until_initialized().await?;
//! assert!(engine.identity().user.is_none());
//!
//! let identity = engine.sign_in_with_password("coach@example.com", "secret").await?;
//! assert!(identity.is_privileged);
//!
//! engine.sign_out().await?;
//! assert!(engine.identity().user.is_none());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use handle_trait::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::{
    Result,
    backend::{AuthBackend, ProfileStore},
    cache::{InMemoryStore, KeyValueStore, SessionCache},
    clock::Clock,
    resolver::ProfileResolver,
    tracker::RequestTracker,
    types::{DerivedIdentity, Session},
};

mod config;
mod driver;
pub mod errors;
mod machine;
mod state;

pub use config::EngineConfig;
pub use errors::EngineError;
pub use state::{EngineNotice, EnginePhase};

use driver::{Command, EngineDriver, Outputs};
use machine::SessionMachine;

/// Capacity of the notice broadcast; slow listeners lose the oldest notices.
const NOTICE_CAPACITY: usize = 32;

struct EngineInternal {
    auth: Arc<dyn AuthBackend>,
    commands: mpsc::Sender<Command>,
    identity: watch::Receiver<DerivedIdentity>,
    session: watch::Receiver<Option<Session>>,
    phase: watch::Receiver<EnginePhase>,
    initialized: watch::Receiver<bool>,
    notices: broadcast::Sender<EngineNotice>,
    tracker: RequestTracker,
    cache: SessionCache,
    config: EngineConfig,
}

impl std::fmt::Debug for EngineInternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInternal")
            .field("phase", &*self.phase.borrow())
            .field("identity", &*self.identity.borrow())
            .field("in_flight", &self.tracker.in_flight())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a mounted session engine.
#[derive(Clone, Debug, Handle)]
pub struct SessionEngine {
    inner: Arc<EngineInternal>,
}

/// Weak reference to a [`SessionEngine`].
///
/// Does not keep the engine mounted. Use [`upgrade`](Self::upgrade) to get a
/// handle back while it is still alive.
#[derive(Clone, Debug, Handle)]
pub struct WeakSessionEngine {
    inner: Weak<EngineInternal>,
}

impl WeakSessionEngine {
    pub fn upgrade(&self) -> Option<SessionEngine> {
        self.inner.upgrade().map(|inner| SessionEngine { inner })
    }
}

/// Configures and mounts a [`SessionEngine`].
pub struct SessionEngineBuilder {
    auth: Arc<dyn AuthBackend>,
    profiles: Arc<dyn ProfileStore>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl SessionEngineBuilder {
    /// Persist the profile cache in `store` instead of process memory.
    pub fn with_cache_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used to timestamp cache entries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Spawn the engine task on the current Tokio runtime.
    ///
    /// The engine starts initializing immediately; use
    /// [`SessionEngine::wait_until_initialized`] to gate first paint.
    pub fn mount(self) -> Result<SessionEngine> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::NoRuntime.into());
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let mut cache = SessionCache::with_prefix(store, self.config.cache_prefix.clone());
        if let Some(clock) = self.clock {
            cache = cache.with_clock(clock);
        }
        let tracker = RequestTracker::new();

        let (commands, command_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (identity_tx, identity) = watch::channel(DerivedIdentity::initializing());
        let (session_tx, session) = watch::channel(None);
        let (phase_tx, phase) = watch::channel(EnginePhase::Uninitialized);
        let (initialized_tx, initialized) = watch::channel(false);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let driver = EngineDriver::new(
            self.auth.clone(),
            ProfileResolver::new(self.profiles, cache.clone()),
            SessionMachine::new(tracker.clone(), cache.clone()),
            command_rx,
            Outputs {
                identity: identity_tx,
                session: session_tx,
                phase: phase_tx,
                initialized: initialized_tx,
                notices: notices.clone(),
            },
        );
        tokio::spawn(driver.run());

        Ok(SessionEngine {
            inner: Arc::new(EngineInternal {
                auth: self.auth,
                commands,
                identity,
                session,
                phase,
                initialized,
                notices,
                tracker,
                cache,
                config: self.config,
            }),
        })
    }
}

impl SessionEngine {
    /// Start configuring an engine over the given collaborators.
    pub fn builder(
        auth: Arc<dyn AuthBackend>,
        profiles: Arc<dyn ProfileStore>,
    ) -> SessionEngineBuilder {
        SessionEngineBuilder {
            auth,
            profiles,
            store: None,
            clock: None,
            config: EngineConfig::default(),
        }
    }

    /// Mount an engine with an explicit cache store and configuration.
    pub fn mount(
        auth: Arc<dyn AuthBackend>,
        profiles: Arc<dyn ProfileStore>,
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::builder(auth, profiles)
            .with_cache_store(store)
            .with_config(config)
            .mount()
    }

    pub fn downgrade(&self) -> WeakSessionEngine {
        WeakSessionEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The currently published identity.
    pub fn identity(&self) -> DerivedIdentity {
        self.inner.identity.borrow().clone()
    }

    /// A receiver that is notified whenever the published identity changes.
    ///
    /// Consecutive identical identities are never published twice.
    pub fn subscribe(&self) -> watch::Receiver<DerivedIdentity> {
        self.inner.identity.clone()
    }

    /// Read-only copy of the raw session.
    pub fn session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    pub fn phase(&self) -> EnginePhase {
        *self.inner.phase.borrow()
    }

    /// A receiver for phase changes; closed once the engine task has stopped.
    pub fn watch_phase(&self) -> watch::Receiver<EnginePhase> {
        self.inner.phase.clone()
    }

    /// Whether the first settled identity has been published.
    pub fn is_initialized(&self) -> bool {
        *self.inner.initialized.borrow()
    }

    /// Wait for the first settled identity and return the current one.
    pub async fn wait_until_initialized(&self) -> Result<DerivedIdentity> {
        let mut initialized = self.inner.initialized.clone();
        initialized
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| EngineError::Unmounted)?;
        Ok(self.identity())
    }

    /// Subscribe to engine notices.
    pub fn notices(&self) -> broadcast::Receiver<EngineNotice> {
        self.inner.notices.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &SessionCache {
        &self.inner.cache
    }

    /// The authentication backend this engine listens to.
    pub fn auth(&self) -> Arc<dyn AuthBackend> {
        self.inner.auth.clone()
    }

    /// Number of profile resolutions currently registered.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.in_flight()
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.commands.is_closed() || self.phase() == EnginePhase::Unmounted
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::Unmounted)?;
        Ok(response.await.map_err(|_| EngineError::Unmounted)?)
    }

    /// Sign out.
    ///
    /// Local state is cleared first and stays cleared even when the backend
    /// call fails; that failure is still returned.
    pub async fn sign_out(&self) -> Result<()> {
        self.request(|reply| Command::SignOutLocal { reply }).await?;
        if let Err(e) = self.inner.auth.sign_out().await {
            warn!(error = %e, "Backend sign-out failed, local session already cleared");
            return Err(e);
        }
        Ok(())
    }

    /// Password login.
    ///
    /// Returns once the signed-in user's profile has been resolved and
    /// published. A user without a profile is signed out again and
    /// [`EngineError::InvalidAccount`] is returned.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<DerivedIdentity> {
        self.wait_until_initialized().await?;
        let session = self.inner.auth.sign_in_with_password(email, password).await?;
        let user_id = session.user_id.clone();
        info!(user_id = %user_id, "Password sign-in accepted, waiting for profile");

        let timeout = self.inner.config.sign_in_timeout();
        let settled = tokio::time::timeout(
            timeout,
            self.request(|reply| Command::AwaitSettled { user_id, reply }),
        )
        .await
        .map_err(|_| EngineError::SignInTimeout {
            timeout_ms: self.inner.config.sign_in_timeout_ms,
        })??;
        Ok(settled?)
    }

    /// Revalidate the current user's profile against the profile store.
    pub async fn refresh_profile(&self) -> Result<DerivedIdentity> {
        let refreshed = self.request(|reply| Command::Refresh { reply }).await?;
        Ok(refreshed?)
    }

    /// Ask the backend to send a password-reset email.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<()> {
        self.inner
            .auth
            .reset_password_for_email(email, redirect_to)
            .await
    }

    /// Change the signed-in user's password.
    pub async fn update_password(&self, new_password: &str) -> Result<()> {
        if self.session().is_none() {
            return Err(EngineError::NotAuthenticated.into());
        }
        self.inner.auth.update_password(new_password).await
    }

    /// Stop the engine task.
    ///
    /// In-flight resolutions are cancelled and their results discarded. The
    /// last published identity stays readable. Unmounting twice is a no-op.
    pub async fn unmount(&self) -> Result<()> {
        match self.request(|reply| Command::Unmount { reply }).await {
            Ok(()) => Ok(()),
            Err(crate::Error::Engine(EngineError::Unmounted)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
