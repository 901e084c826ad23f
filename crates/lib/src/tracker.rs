//! Request lifecycle tracking and cooperative cancellation.
//!
//! The transports used by the engine cannot abort a request once it is on the
//! wire. Cancellation is therefore advisory: every asynchronous operation
//! registers itself and receives a [`RequestGuard`] stamped with the current
//! generation. [`RequestTracker::cancel_all`] bumps the generation, which makes
//! every outstanding guard report [`is_live`](RequestGuard::is_live) `false`.
//! Continuations check their guard before touching shared state and simply
//! drop their result when it is no longer live.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tracing::{debug, trace};
use uuid::Uuid;

/// Opaque identifier of one tracked request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct TrackerState {
    generation: AtomicU64,
    mounted: AtomicBool,
    /// In-flight requests and a short label for logging
    in_flight: Mutex<HashMap<RequestId, &'static str>>,
}

/// Registry of in-flight requests with a shared liveness generation.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct RequestTracker {
    state: Arc<TrackerState>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TrackerState {
                generation: AtomicU64::new(0),
                mounted: AtomicBool::new(true),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Current generation. Bumped by every [`cancel_all`](Self::cancel_all).
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Whether the owning context is still mounted.
    pub fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::SeqCst)
    }

    /// Register a new request under the current generation.
    ///
    /// The returned guard deregisters the request when dropped.
    pub fn register(&self, label: &'static str) -> RequestGuard {
        let id = RequestId::new();
        self.state.in_flight.lock().unwrap().insert(id, label);
        let generation = self.generation();
        trace!(request = %id, label, generation, "Registered request");
        RequestGuard {
            id,
            generation,
            tracker: self.clone(),
        }
    }

    /// Remove a request from the registry.
    ///
    /// Deregistering an unknown or already cancelled id is a no-op.
    pub fn deregister(&self, id: RequestId) {
        if self.state.in_flight.lock().unwrap().remove(&id).is_some() {
            trace!(request = %id, "Deregistered request");
        }
    }

    /// Invalidate every outstanding request and empty the registry.
    ///
    /// Returns the new generation.
    pub fn cancel_all(&self) -> u64 {
        let cancelled = {
            let mut in_flight = self.state.in_flight.lock().unwrap();
            let n = in_flight.len();
            in_flight.clear();
            n
        };
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(cancelled, generation, "Cancelled in-flight requests");
        generation
    }

    /// Tear down: cancel everything and refuse to consider any guard live again.
    pub fn unmount(&self) {
        self.state.mounted.store(false, Ordering::SeqCst);
        self.cancel_all();
    }

    /// Number of registered requests.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.lock().unwrap().len()
    }

    /// Whether a request registered at `generation` may still write shared state.
    pub fn is_current(&self, generation: u64) -> bool {
        self.is_mounted() && self.generation() == generation
    }
}

/// Liveness token held by one in-flight request.
#[derive(Debug)]
pub struct RequestGuard {
    id: RequestId,
    generation: u64,
    tracker: RequestTracker,
}

impl RequestGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Generation the request was registered under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the request's result may still be applied.
    pub fn is_live(&self) -> bool {
        self.tracker.is_current(self.generation)
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.tracker.deregister(self.id);
    }
}
