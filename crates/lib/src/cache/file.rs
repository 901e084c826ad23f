//! JSON-file backed key/value store.
//!
//! The whole store is one small JSON document that is rewritten after every
//! mutation. Writes go to a sibling temporary file first and are then renamed
//! into place, so a crash mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{KeyValueStore, errors::CacheError};

/// Current on-disk format version.
const PERSISTENCE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct SerializableStore {
    version: u8,
    entries: BTreeMap<String, String>,
}

/// Key/value store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// A file written by an unknown format version is ignored and replaced on
    /// the next write; the cache only ever holds re-fetchable data.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(json) => {
                let stored: SerializableStore =
                    serde_json::from_str(&json).map_err(|source| {
                        CacheError::DeserializationFailed {
                            key: path.display().to_string(),
                            source,
                        }
                    })?;
                if stored.version == PERSISTENCE_VERSION {
                    debug!(path = %path.display(), entries = stored.entries.len(), "Loaded cache file");
                    stored.entries
                } else {
                    warn!(
                        path = %path.display(),
                        version = stored.version,
                        "Ignoring cache file with unsupported version"
                    );
                    BTreeMap::new()
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(CacheError::FileIo {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        let serializable = SerializableStore {
            version: PERSISTENCE_VERSION,
            entries: entries.clone(),
        };
        let json = serde_json::to_string_pretty(&serializable).map_err(|source| {
            CacheError::SerializationFailed {
                key: self.path.display().to_string(),
                source,
            }
        })?;

        let io_err = |source| CacheError::FileIo {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }
}
