//! Cache store with an ephemeral and a persisted tier.

use super::key::CacheKey;
use super::persist::{load_document, write_document};
use crate::error::Result;
use crate::paths;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, warn};

/// Which cache tier an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    /// Process-lifetime storage.
    #[default]
    Ephemeral,
    /// Storage backed by the durable JSON document.
    Persisted,
}

impl From<bool> for Tier {
    fn from(persist: bool) -> Self {
        if persist {
            Tier::Persisted
        } else {
            Tier::Ephemeral
        }
    }
}

/// Two-tier key/value cache of JSON values.
///
/// The persisted snapshot is read from disk at most once per store; after
/// that the in-memory copy is authoritative and every mutation schedules a
/// whole-document rewrite. Rewrites are serialized and never let an older
/// snapshot replace a newer one.
pub struct CacheStore {
    ephemeral: Mutex<HashMap<String, Value>>,
    persisted: OnceLock<Mutex<Map<String, Value>>>,
    writer: Arc<DocumentWriter>,
}

impl CacheStore {
    /// Create a store whose persisted tier is backed by `document_path`.
    ///
    /// Nothing is read until the persisted tier is first accessed.
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            ephemeral: Mutex::new(HashMap::new()),
            persisted: OnceLock::new(),
            writer: Arc::new(DocumentWriter::new(document_path.into())),
        }
    }

    /// Create a store backed by the default document in the data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(paths::cache_document_path()?))
    }

    /// Path of the persisted document.
    pub fn document_path(&self) -> &Path {
        &self.writer.path
    }

    /// Look up a value.
    pub fn get(&self, key: impl Into<CacheKey>, tier: Tier) -> Option<Value> {
        let key = key.into();
        let value = match tier {
            Tier::Ephemeral => lock(&self.ephemeral).get(key.as_str()).cloned(),
            Tier::Persisted => lock(self.persisted()).get(key.as_str()).cloned(),
        };
        debug!(
            "Cache {} for {} ({:?})",
            if value.is_some() { "hit" } else { "miss" },
            key,
            tier
        );
        value
    }

    /// Store a value, overwriting any previous entry.
    pub fn set(&self, key: impl Into<CacheKey>, value: Value, tier: Tier) {
        let key = key.into().into_string();
        match tier {
            Tier::Ephemeral => {
                lock(&self.ephemeral).insert(key, value);
            }
            Tier::Persisted => {
                let mut map = lock(self.persisted());
                map.insert(key, value);
                self.schedule_write(&map);
            }
        }
    }

    /// Remove one entry, or every entry of the tier when `key` is `None`.
    pub fn clear(&self, key: Option<&CacheKey>, tier: Tier) {
        match tier {
            Tier::Ephemeral => {
                let mut map = lock(&self.ephemeral);
                match key {
                    Some(key) => {
                        map.remove(key.as_str());
                    }
                    None => map.clear(),
                }
            }
            Tier::Persisted => {
                let mut map = lock(self.persisted());
                match key {
                    Some(key) => {
                        map.remove(key.as_str());
                    }
                    None => map.clear(),
                }
                self.schedule_write(&map);
            }
        }
    }

    /// Number of entries in a tier.
    pub fn len(&self, tier: Tier) -> usize {
        match tier {
            Tier::Ephemeral => lock(&self.ephemeral).len(),
            Tier::Persisted => lock(self.persisted()).len(),
        }
    }

    pub fn is_empty(&self, tier: Tier) -> bool {
        self.len(tier) == 0
    }

    /// Write the current persisted snapshot synchronously.
    ///
    /// Background writes are best-effort; this surfaces the error. Does
    /// nothing if the persisted tier was never loaded.
    pub fn flush(&self) -> Result<()> {
        let Some(persisted) = self.persisted.get() else {
            return Ok(());
        };
        let (generation, contents) = {
            let map = lock(persisted);
            (self.writer.next_generation(), serde_json::to_string(&*map)?)
        };
        self.writer.write(generation, &contents)
    }

    fn persisted(&self) -> &Mutex<Map<String, Value>> {
        self.persisted
            .get_or_init(|| Mutex::new(load_document(&self.writer.path)))
    }

    /// Serialize the snapshot and hand it to the writer.
    ///
    /// Called with the persisted map locked so generations follow mutation order.
    fn schedule_write(&self, map: &Map<String, Value>) {
        let generation = self.writer.next_generation();
        let contents = match serde_json::to_string(map) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to serialize persisted cache: {}", e);
                return;
            }
        };

        let writer = Arc::clone(&self.writer);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || writer.write_best_effort(generation, &contents));
            }
            Err(_) => writer.write_best_effort(generation, &contents),
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("document_path", &self.writer.path)
            .field("persisted_loaded", &self.persisted.get().is_some())
            .finish()
    }
}

/// Serializes rewrites of the persisted document.
struct DocumentWriter {
    path: PathBuf,
    generation: AtomicU64,
    /// Generation of the last snapshot handed to disk.
    last_written: Mutex<u64>,
}

impl DocumentWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            generation: AtomicU64::new(0),
            last_written: Mutex::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn write(&self, generation: u64, contents: &str) -> Result<()> {
        let mut last_written = lock(&self.last_written);
        if generation <= *last_written {
            debug!(
                "Skipping stale cache snapshot {} (last written {})",
                generation, *last_written
            );
            return Ok(());
        }
        *last_written = generation;
        write_document(&self.path, contents)
    }

    fn write_best_effort(&self, generation: u64, contents: &str) {
        if let Err(e) = self.write(generation, contents) {
            warn!("Failed to persist cache to {}: {}", self.path.display(), e);
        }
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
