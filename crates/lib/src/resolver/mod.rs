//! Profile resolution with a local cache in front of the profile store.
//!
//! Two resolution policies:
//!
//! * [`ResolveMode::CacheFirst`] trusts a cache hit and skips the network.
//!   Used when replaying a restored session and on token refresh.
//! * [`ResolveMode::Revalidate`] always asks the profile store, so role or
//!   name changes made elsewhere show up after a genuine sign-in. A cached
//!   copy is only used if the fetch fails.
//!
//! The resolver only reads the cache. Fresh rows are written back by the
//! engine once it has accepted the resolution, so a fetch that lost a race
//! against a sign-out cannot resurrect a cleared entry.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{backend::ProfileStore, cache::SessionCache, types::Profile};

pub mod errors;

pub use errors::ResolveError;

/// How much to trust the cache for one resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveMode {
    /// Return a cached profile without fetching; fetch only on a miss.
    CacheFirst,
    /// Always fetch; fall back to the cache only if the fetch fails.
    Revalidate,
}

/// Where a resolved profile came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    /// Fetched from the profile store; the cache has not seen it yet.
    Fresh,
    /// The fetch failed and the cached copy was returned instead.
    StaleFallback { reason: String },
}

/// A successfully resolved profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub profile: Profile,
    pub source: ResolutionSource,
}

/// Resolves user ids to profiles.
///
/// Does not deduplicate concurrent resolutions; the engine guarantees at
/// most one per user.
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    cache: SessionCache,
}

impl std::fmt::Debug for ProfileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileResolver")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>, cache: SessionCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// The cached profile for `user_id`, without touching the network.
    pub fn cached(&self, user_id: &str) -> Option<Profile> {
        self.cache.get(user_id)
    }

    /// Resolve the profile for `user_id`.
    pub async fn resolve(
        &self,
        user_id: &str,
        mode: ResolveMode,
    ) -> Result<Resolution, ResolveError> {
        let entry = self.cache.entry(user_id);

        if mode == ResolveMode::CacheFirst
            && let Some(entry) = &entry
        {
            debug!(user_id, cached_at = %entry.cached_at(), "Profile served from cache");
            return Ok(Resolution {
                profile: entry.profile.clone(),
                source: ResolutionSource::Cache,
            });
        }
        let cached = entry.map(|entry| entry.profile);

        match self.store.fetch_profile(user_id).await {
            Ok(Some(profile)) => Ok(Resolution {
                profile,
                source: ResolutionSource::Fresh,
            }),
            Ok(None) => {
                debug!(user_id, had_cached = cached.is_some(), "Profile store has no row");
                Err(ResolveError::ProfileNotFound {
                    user_id: user_id.to_string(),
                })
            }
            Err(e) => match cached {
                Some(profile) => {
                    warn!(user_id, error = %e, "Profile fetch failed, using cached copy");
                    Ok(Resolution {
                        profile,
                        source: ResolutionSource::StaleFallback {
                            reason: e.to_string(),
                        },
                    })
                }
                None => Err(ResolveError::ProfileFetchFailed {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}
