// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the filter asset cache

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use stylecam::FilterAssetCache;
use stylecam::backends::assets::{EmbeddedAssetStore, InMemoryAssetStore};
use stylecam::constants::FILTER_METADATA_FILE;
use stylecam::filters::FilterCatalog;

fn png(size: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(size, size, image::Rgba([0, 128, 255, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn slow_store(ids: &[&str], delay: Duration) -> Arc<InMemoryAssetStore> {
    let store = InMemoryAssetStore::new().with_read_delay(delay);
    for id in ids {
        let json = format!(
            r#"{{"id":"{id}","name":"{id}","category":"hair","layers":[{{"image":"layer.png","anchor":{{"type":"hair","clip_to_mask":true}}}}]}}"#
        );
        store.insert(id, FILTER_METADATA_FILE, json.into_bytes());
        store.insert(id, "layer.png", png(8));
    }
    Arc::new(store)
}

async fn wait_until_cached(cache: &FilterAssetCache, id: &str) -> bool {
    for _ in 0..100 {
        if cache.contains(id) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_decode_once() {
    let store = slow_store(&["streaks"], Duration::from_millis(50));
    let cache = Arc::new(FilterAssetCache::new(store.clone(), 1 << 20));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.load("streaks").await })
        })
        .collect();

    let mut loaded = Vec::new();
    for task in tasks {
        loaded.push(task.await.unwrap().unwrap());
    }

    for assets in &loaded[1..] {
        assert!(Arc::ptr_eq(&loaded[0], assets));
    }
    let stats = cache.stats();
    assert_eq!(stats.decodes, 1);
    assert_eq!(stats.entries, 1);
    // filter.json + layer.png, read once
    assert_eq!(store.reads(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_distinct_filters_load_independently() {
    let store = slow_store(&["a", "b"], Duration::from_millis(20));
    let cache = Arc::new(FilterAssetCache::new(store, 1 << 20));

    let (a, b) = tokio::join!(cache.load("a"), cache.load("b"));
    assert_eq!(a.unwrap().id(), "a");
    assert_eq!(b.unwrap().id(), "b");
    assert_eq!(cache.stats().decodes, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_waiter_still_populates_cache() {
    let store = slow_store(&["a"], Duration::from_millis(40));
    let cache = Arc::new(FilterAssetCache::new(store, 1 << 20));

    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.load("a").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    waiter.abort();

    assert!(wait_until_cached(&cache, "a").await);
    assert_eq!(cache.stats().decodes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_keeps_in_flight_result() {
    let store = slow_store(&["a"], Duration::from_millis(40));
    let cache = Arc::new(FilterAssetCache::new(store, 1 << 20));

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.load("a").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.clear();

    assert!(pending.await.unwrap().is_ok());
    assert!(cache.contains("a"));
}

#[tokio::test]
async fn test_builtin_filters_load() {
    let store = Arc::new(EmbeddedAssetStore::new());
    let catalog = FilterCatalog::discover(store.as_ref()).unwrap();
    assert_eq!(catalog.len(), 3);

    let cache = FilterAssetCache::new(store, 8 << 20);
    let report = cache.preload(catalog.ids()).await;
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert_eq!(report.loaded.len(), 3);

    let glam = cache.load("glam").await.unwrap();
    for layer in &glam.definition().layers {
        assert!(glam.image(&layer.image).is_some());
    }
}
