// SPDX-License-Identifier: GPL-3.0-only

//! Filter asset cache
//!
//! Decoded filter assets are cached by filter id under a byte budget and
//! evicted least-recently-used first.
//!
//! ```text
//! load(id) ─► resident? ──yes──► hit
//!               │ no
//!               ▼
//!            in flight? ──yes──► await the shared load
//!               │ no
//!               ▼
//!            spawn load task ─► read + decode (blocking pool)
//!                                   │
//!                                   ▼
//!                    insert, evict LRU until under budget
//! ```
//!
//! At most one load per id runs at a time: later callers attach to the
//! in-flight load's shared future. The load runs as its own task, so it
//! finishes and populates the cache even if every caller gave up waiting.

use super::assets::FilterAssets;
use crate::backends::assets::AssetStore;
use crate::errors::{FilterLoadError, StorageError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

type LoadResult = Result<Arc<FilterAssets>, FilterLoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Loads answered from a resident entry
    pub hits: u64,
    /// Loads that found no resident entry (including ones that joined an
    /// in-flight load)
    pub misses: u64,
    /// Store reads + image decodes actually performed
    pub decodes: u64,
    /// Entries dropped to stay within the budget
    pub evictions: u64,
    /// Decoded bytes currently resident
    pub resident_bytes: usize,
    /// Resident entries
    pub entries: usize,
}

/// Outcome of [`FilterAssetCache::preload`]
#[derive(Debug, Clone, Default)]
pub struct PreloadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, FilterLoadError)>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<FilterAssets>>,
    /// Front = least recently used
    lru: VecDeque<String>,
    in_flight: HashMap<String, SharedLoad>,
    resident_bytes: usize,
    hits: u64,
    misses: u64,
    decodes: u64,
    evictions: u64,
}

impl CacheState {
    fn touch(&mut self, id: &str) {
        if let Some(pos) = self.lru.iter().position(|key| key == id) {
            if let Some(key) = self.lru.remove(pos) {
                self.lru.push_back(key);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Arc<FilterAssets>> {
        let assets = self.entries.remove(id)?;
        self.lru.retain(|key| key != id);
        self.resident_bytes = self.resident_bytes.saturating_sub(assets.byte_size());
        Some(assets)
    }

    fn insert(&mut self, assets: Arc<FilterAssets>, budget: usize) {
        let id = assets.id().to_string();
        let size = assets.byte_size();

        if size > budget {
            warn!(
                filter = %id,
                bytes = size,
                budget,
                "Filter assets exceed the cache budget, not retained"
            );
            return;
        }

        self.remove(&id);
        self.entries.insert(id.clone(), assets);
        self.lru.push_back(id.clone());
        self.resident_bytes += size;

        while self.resident_bytes > budget {
            let Some(victim) = self.lru.front().cloned() else {
                break;
            };
            if victim == id {
                break;
            }
            if let Some(evicted) = self.remove(&victim) {
                self.evictions += 1;
                debug!(
                    filter = %victim,
                    bytes = evicted.byte_size(),
                    resident = self.resident_bytes,
                    "Evicted filter assets"
                );
            }
        }
    }
}

/// Bounded, thread-safe cache of decoded filter assets
pub struct FilterAssetCache {
    store: Arc<dyn AssetStore>,
    budget_bytes: usize,
    state: Arc<Mutex<CacheState>>,
}

impl FilterAssetCache {
    pub fn new(store: Arc<dyn AssetStore>, budget_bytes: usize) -> Self {
        Self {
            store,
            budget_bytes,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the assets for `filter_id`, loading them if needed
    ///
    /// Must be called from within a tokio runtime.
    pub async fn load(&self, filter_id: &str) -> LoadResult {
        let shared = {
            let mut state = self.lock();

            if let Some(assets) = state.entries.get(filter_id).cloned() {
                state.hits += 1;
                state.touch(filter_id);
                return Ok(assets);
            }

            state.misses += 1;
            match state.in_flight.get(filter_id) {
                Some(load) => {
                    debug!(filter = filter_id, "Joining in-flight filter load");
                    load.clone()
                }
                None => {
                    let load = self.spawn_load(filter_id.to_string());
                    state.in_flight.insert(filter_id.to_string(), load.clone());
                    load
                }
            }
        };

        shared.await
    }

    /// Start the load task for `filter_id` (state lock held by the caller)
    fn spawn_load(&self, filter_id: String) -> SharedLoad {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let budget = self.budget_bytes;

        let task = tokio::spawn(async move {
            let decode_id = filter_id.clone();
            let decode_state = Arc::clone(&state);
            let result = tokio::task::spawn_blocking(move || {
                decode_state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .decodes += 1;
                FilterAssets::load(store.as_ref(), &decode_id).map(Arc::new)
            })
            .await
            .unwrap_or_else(|e| {
                Err(FilterLoadError::Storage(StorageError::Io(format!(
                    "filter load task failed: {}",
                    e
                ))))
            });

            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.in_flight.remove(&filter_id);
            match &result {
                Ok(assets) => state.insert(Arc::clone(assets), budget),
                Err(e) => debug!(filter = %filter_id, error = %e, "Filter load failed"),
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(FilterLoadError::Storage(StorageError::Io(format!(
                    "filter load task failed: {}",
                    e
                ))))
            })
        }
        .boxed()
        .shared()
    }

    /// Best-effort load of several filters
    ///
    /// Runs the loads concurrently; individual failures are reported, not
    /// propagated.
    pub async fn preload<I, S>(&self, filter_ids: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = filter_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let results = futures::future::join_all(ids.iter().map(|id| self.load(id))).await;

        let mut report = PreloadReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(_) => report.loaded.push(id),
                Err(e) => {
                    warn!(filter = %id, error = %e, "Failed to preload filter");
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Filter preload finished"
        );
        report
    }

    /// Evict every resident entry
    ///
    /// Loads already in flight still complete and are cached.
    pub fn clear(&self) {
        let mut state = self.lock();
        let freed = state.resident_bytes;
        let count = state.entries.len();
        state.entries.clear();
        state.lru.clear();
        state.resident_bytes = 0;
        info!(entries = count, bytes = freed, "Cleared filter asset cache");
    }

    /// Check if `filter_id` is resident
    pub fn contains(&self, filter_id: &str) -> bool {
        self.lock().entries.contains_key(filter_id)
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock().resident_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            decodes: state.decodes,
            evictions: state.evictions,
            resident_bytes: state.resident_bytes,
            entries: state.entries.len(),
        }
    }
}
