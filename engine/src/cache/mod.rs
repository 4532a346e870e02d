//! Content-addressed model-call cache
//!
//! The cache memoizes external model calls by a deterministic key over
//! `(model, parameters, system_prompt, user_prompt, iteration)`. Every call
//! site checks the cache before calling out, which guarantees at most one
//! externally observable call per distinct key within a store's lifetime.
//! Concurrent tasks racing on an identical key are NOT deduplicated against
//! each other mid-flight; both call out and one entry wins, which is wasteful
//! but correct because entries are pure functions of their key.
//!
//! # Write modes
//!
//! - **Immediate** (default): `store` makes the entry visible to `fetch` and,
//!   when a SQLite store is attached, persists it right away.
//! - **Deferred**: `store` buffers the entry; it stays invisible to `fetch`
//!   from any task until `flush` promotes it. This is a documented
//!   consistency trade-off for write batching, not a bug.
//!
//! # Sharing
//!
//! `Cache` is a cheap clone over shared state. Lookups and stores only take a
//! short-lived mutex; nothing suspends while holding it.

pub mod entry;
pub mod jsonl;
pub mod sqlite;

pub use entry::{gen_key, CacheEntry};
pub use sqlite::SqliteStore;

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Default)]
struct CacheState {
    /// Entries visible to `fetch`
    data: HashMap<String, CacheEntry>,
    /// Entries created during this run (visible or deferred)
    new_entries: HashMap<String, CacheEntry>,
    /// Entries buffered until `flush` (deferred mode only)
    deferred: HashMap<String, CacheEntry>,
    /// Entries returned by `fetch` during this run
    fetched: HashMap<String, CacheEntry>,
}

/// Shared cache handle
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Mutex<CacheState>>,
    store: Option<SqliteStore>,
    immediate_write: bool,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// In-memory cache with immediate writes
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            store: None,
            immediate_write: true,
        }
    }

    /// In-memory cache that buffers writes until `flush`
    pub fn with_deferred_writes() -> Self {
        Self {
            immediate_write: false,
            ..Self::new()
        }
    }

    /// In-memory cache seeded with existing entries
    pub fn from_entries(entries: HashMap<String, CacheEntry>) -> Self {
        let cache = Self::new();
        {
            let mut state = cache.lock_state();
            state.data = entries;
        }
        cache
    }

    /// Cache backed by a SQLite database; existing entries are loaded into
    /// memory, new entries are persisted per the write mode.
    pub async fn open_sqlite(db_path: &Path, immediate_write: bool) -> Result<Self> {
        let store = SqliteStore::new(db_path).await?;
        let data = store.load_all().await?;
        debug!("Cache opened with {} persisted entries", data.len());
        let cache = Self {
            inner: Arc::new(Mutex::new(CacheState {
                data,
                ..CacheState::default()
            })),
            store: Some(store),
            immediate_write,
        };
        Ok(cache)
    }

    /// In-memory cache seeded from a JSONL export
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let entries = jsonl::read_jsonl(path)?;
        Ok(Self::from_entries(entries))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // Lock poisoning only happens if a holder panicked; the state is a
        // plain map and still usable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fetch a memoized model output. Pure lookup, no side effect on the
    /// visible data, O(1), non-suspending.
    pub fn fetch(
        &self,
        model: &str,
        parameters: &serde_json::Value,
        system_prompt: &str,
        user_prompt: &str,
        iteration: u32,
    ) -> Option<String> {
        let key = gen_key(model, parameters, system_prompt, user_prompt, iteration);
        let mut state = self.lock_state();
        let entry = state.data.get(&key).cloned()?;
        let output = entry.output.clone();
        state.fetched.insert(key, entry);
        Some(output)
    }

    /// Store a successful model response under its deterministic key.
    ///
    /// Returns the key. Fails with `SerializationError` if the response
    /// cannot be represented; a persistence failure is logged and the entry
    /// kept in memory (the run stays correct, one memoization is lost).
    pub async fn store<R: serde::Serialize + ?Sized>(
        &self,
        model: &str,
        parameters: &serde_json::Value,
        system_prompt: &str,
        user_prompt: &str,
        response: &R,
        iteration: u32,
    ) -> Result<String, EngineError> {
        let output = serde_json::to_string(response)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        let entry = CacheEntry::new(
            model,
            parameters.clone(),
            system_prompt,
            user_prompt,
            iteration,
            output,
        );
        let key = entry.key();

        {
            let mut state = self.lock_state();
            state.new_entries.insert(key.clone(), entry.clone());
            if self.immediate_write {
                state.data.insert(key.clone(), entry.clone());
            } else {
                state.deferred.insert(key.clone(), entry.clone());
            }
        }

        if self.immediate_write {
            if let Some(store) = &self.store {
                if let Err(e) = store.put(&key, &entry).await {
                    warn!("Cache persistence failed for {}: {:#}", key, e);
                }
            }
        }

        Ok(key)
    }

    /// Promote deferred entries into the visible data and persist everything
    /// new to the backing store, if any. Called at end of a run scope.
    pub async fn flush(&self) -> Result<()> {
        let (deferred_count, to_persist) = {
            let mut state = self.lock_state();
            let deferred: Vec<(String, CacheEntry)> = state.deferred.drain().collect();
            let count = deferred.len();
            for (key, entry) in deferred {
                state.data.insert(key, entry);
            }
            (count, state.new_entries.clone())
        };
        if deferred_count > 0 {
            debug!("Promoted {} deferred cache entries", deferred_count);
        }
        if let Some(store) = &self.store {
            store
                .put_many(&to_persist)
                .await
                .context("Failed to persist cache entries")?;
        }
        Ok(())
    }

    /// Union another cache's visible entries into this one. Colliding keys
    /// carry identical inputs, so either side's entry is acceptable.
    pub fn merge(&self, other: &Cache) {
        let other_entries = other.entries();
        let mut state = self.lock_state();
        for (key, entry) in other_entries {
            state.data.entry(key).or_insert(entry);
        }
    }

    /// A new in-memory cache holding the union of two caches
    pub fn merged(a: &Cache, b: &Cache) -> Cache {
        let cache = Cache::from_entries(a.entries());
        cache.merge(b);
        cache
    }

    /// Add pre-existing entries (e.g. from a JSONL import)
    pub fn add_entries(&self, entries: HashMap<String, CacheEntry>) {
        let mut state = self.lock_state();
        state.data.extend(entries);
    }

    /// Number of visible entries
    pub fn len(&self) -> usize {
        self.lock_state().data.len()
    }

    /// Whether the cache holds no visible entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible keys
    pub fn keys(&self) -> Vec<String> {
        self.lock_state().data.keys().cloned().collect()
    }

    /// Snapshot of the visible entries
    pub fn entries(&self) -> HashMap<String, CacheEntry> {
        self.lock_state().data.clone()
    }

    /// Snapshot of the entries created during this run
    pub fn new_entries(&self) -> HashMap<String, CacheEntry> {
        self.lock_state().new_entries.clone()
    }

    /// A cache holding only the entries this run created or touched — the
    /// shareable "piece of the cache" for a particular run.
    pub fn new_entries_cache(&self) -> Cache {
        let state = self.lock_state();
        let mut entries = state.fetched.clone();
        entries.extend(state.new_entries.clone());
        drop(state);
        Cache::from_entries(entries)
    }

    /// Export the visible entries to a JSONL file (atomic rename)
    pub fn export_jsonl(&self, path: &Path) -> Result<()> {
        jsonl::write_jsonl(path, &self.entries())
    }

    /// An example cache with one entry
    pub fn example() -> Self {
        let entry = CacheEntry::example();
        Self::from_entries(HashMap::from([(entry.key(), entry)]))
    }
}
