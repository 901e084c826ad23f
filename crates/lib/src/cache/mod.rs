//! Local profile cache.
//!
//! The engine never talks to persistent storage directly. It goes through a
//! [`KeyValueStore`], which can be an [`InMemoryStore`] (tests, ephemeral
//! sessions) or a [`FileStore`] (survives restarts), wrapped in a typed
//! [`SessionCache`].

use std::fmt::Debug;

pub mod errors;
mod file;
mod in_memory;
mod session_cache;

pub use errors::CacheError;
pub use file::FileStore;
pub use in_memory::InMemoryStore;
pub use session_cache::{CachedProfile, SessionCache};

/// Minimal string key/value storage.
///
/// Implementations must be safe to share between the engine task and the
/// resolver tasks it spawns.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any existing value.
    fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Remove `key` if present.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    fn clear_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}
