//! Typed profile cache over a [`KeyValueStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{KeyValueStore, errors::CacheError};
use crate::{
    clock::{Clock, SystemClock},
    constants::PROFILE_CACHE_PREFIX,
    types::Profile,
};

/// A cached profile together with when it was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    pub profile: Profile,
    pub cached_at_millis: u64,
}

impl CachedProfile {
    /// When the entry was written.
    pub fn cached_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.cached_at_millis as i64)
            .unwrap_or_default()
    }
}

/// Maps user id to the last known [`Profile`].
///
/// Entries are stored as JSON under `<prefix><user_id>`. The cache is a
/// cheap-to-clone handle; clones share the underlying store.
///
/// Reads never fail: an unreadable or corrupt entry is logged and treated as
/// a miss, since every entry can be re-fetched from the profile store.
#[derive(Clone, Debug)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl SessionCache {
    /// Create a cache using the default key prefix.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(store, PROFILE_CACHE_PREFIX)
    }

    /// Create a cache using a custom key prefix.
    pub fn with_prefix(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used to timestamp entries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.prefix)
    }

    /// Look up the cached entry for `user_id`.
    pub fn entry(&self, user_id: &str) -> Option<CachedProfile> {
        let key = self.key(user_id);
        let raw = match self.store.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(user_id, error = %e, "Profile cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CachedProfile>(&raw) {
            Ok(entry) => Some(entry),
            Err(source) => {
                let e = CacheError::DeserializationFailed { key, source };
                warn!(user_id, error = %e, "Discarding corrupt profile cache entry");
                None
            }
        }
    }

    /// Look up the cached profile for `user_id`.
    pub fn get(&self, user_id: &str) -> Option<Profile> {
        self.entry(user_id).map(|entry| entry.profile)
    }

    /// Store `profile` under its user id, replacing any previous entry.
    pub fn put(&self, profile: &Profile) -> Result<(), CacheError> {
        let key = self.key(&profile.user_id);
        let entry = CachedProfile {
            profile: profile.clone(),
            cached_at_millis: self.clock.now_millis(),
        };
        let json = serde_json::to_string(&entry).map_err(|source| {
            CacheError::SerializationFailed {
                key: key.clone(),
                source,
            }
        })?;
        self.store.set(&key, json)?;
        debug!(user_id = %profile.user_id, role = %profile.role, "Cached profile");
        Ok(())
    }

    /// Drop the entry for one user.
    pub fn invalidate(&self, user_id: &str) -> Result<(), CacheError> {
        self.store.remove(&self.key(user_id))
    }

    /// Drop every profile entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let removed = self.store.clear_prefix(&self.prefix)?;
        debug!(removed, "Cleared profile cache");
        Ok(removed)
    }
}
