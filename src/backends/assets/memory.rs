// SPDX-License-Identifier: MPL-2.0

//! In-memory asset store

use super::AssetStore;
use crate::errors::StorageError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Asset store holding everything in memory
///
/// Counts reads so callers can observe how often assets were actually
/// fetched, and can simulate slow storage.
#[derive(Default)]
pub struct InMemoryAssetStore {
    files: RwLock<BTreeMap<String, BTreeMap<String, Arc<[u8]>>>>,
    reads: AtomicUsize,
    read_delay: Duration,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` on every read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Add or replace an asset
    pub fn insert(&self, filter_id: &str, name: &str, bytes: impl Into<Arc<[u8]>>) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(filter_id.to_string())
            .or_default()
            .insert(name.to_string(), bytes.into());
    }

    /// Number of `read` calls served (including misses)
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl AssetStore for InMemoryAssetStore {
    fn exists(&self, filter_id: &str, name: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filter_id)
            .is_some_and(|files| files.contains_key(name))
    }

    fn read(&self, filter_id: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filter_id)
            .and_then(|files| files.get(name))
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", filter_id, name)))
    }

    fn list(&self, filter_id: &str) -> Result<Vec<String>, StorageError> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filter_id)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| StorageError::NotFound(filter_id.to_string()))
    }

    fn list_filters(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}
