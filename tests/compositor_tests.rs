// SPDX-License-Identifier: MPL-2.0

//! Integration tests for filter compositing

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use stylecam::backends::analysis::{AnalysisClient, AnalysisResult, FixedAnalysisService};
use stylecam::backends::assets::{EmbeddedAssetStore, InMemoryAssetStore};
use stylecam::constants::FILTER_METADATA_FILE;
use stylecam::errors::{CompositionError, FilterLoadError};
use stylecam::filters::{CompositorOptions, FilterCatalog};
use stylecam::{DecodedFrame, FilterAssetCache, FilterCompositor, FilterDefinition};

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A 16x12 frame with a different color in every pixel
fn test_frame() -> DecodedFrame {
    let mut pixels = Vec::with_capacity(16 * 12 * 4);
    for y in 0..12u8 {
        for x in 0..16u8 {
            pixels.extend_from_slice(&[x * 15, y * 20, 255 - x * 10, 255]);
        }
    }
    DecodedFrame::from_rgba(16, 12, pixels).unwrap()
}

/// Full-frame filter with one layer per (blend, color) pair
fn full_frame_filter(store: &InMemoryAssetStore, id: &str, layers: &[(&str, [u8; 4])]) -> FilterDefinition {
    let mut layer_json = Vec::new();
    for (idx, (blend, rgba)) in layers.iter().enumerate() {
        let image = format!("layer{}.png", idx);
        store.insert(id, &image, png(4, 4, *rgba));
        layer_json.push(format!(
            r#"{{"image":"{image}","blend":"{blend}","anchor":{{"type":"fixed","x":0,"y":0,"width":1,"height":1}}}}"#
        ));
    }
    let json = format!(
        r#"{{"id":"{id}","name":"{id}","category":"combo","layers":[{}]}}"#,
        layer_json.join(",")
    );
    store.insert(id, FILTER_METADATA_FILE, json.clone().into_bytes());
    FilterDefinition::from_json(id, json.as_bytes()).unwrap()
}

fn compositor(store: Arc<InMemoryAssetStore>) -> FilterCompositor {
    let cache = Arc::new(FilterAssetCache::new(store, 1 << 20));
    FilterCompositor::new(cache, CompositorOptions::default())
}

#[tokio::test]
async fn test_screen_white_yields_white() {
    let store = Arc::new(InMemoryAssetStore::new());
    let filter = full_frame_filter(&store, "white", &[("screen", [255, 255, 255, 255])]);
    let compositor = compositor(store);

    let source = test_frame();
    let out = compositor
        .compose(&source, &AnalysisResult::empty(16, 12), &filter)
        .await
        .unwrap();

    assert_eq!(out.dimensions(), source.dimensions());
    for px in out.pixels().chunks_exact(4) {
        assert_eq!(px, [255, 255, 255, 255]);
    }
}

#[tokio::test]
async fn test_transparent_layer_is_identity() {
    for blend in ["normal", "screen", "overlay", "multiply"] {
        let store = Arc::new(InMemoryAssetStore::new());
        let filter = full_frame_filter(&store, "clear", &[(blend, [200, 10, 90, 0])]);
        let compositor = compositor(store);

        let source = test_frame();
        let out = compositor
            .compose(&source, &AnalysisResult::empty(16, 12), &filter)
            .await
            .unwrap();
        assert_eq!(out.pixels(), source.pixels(), "blend {}", blend);
    }
}

#[tokio::test]
async fn test_later_layers_draw_over_earlier() {
    let store = Arc::new(InMemoryAssetStore::new());
    let filter = full_frame_filter(
        &store,
        "stack",
        &[("normal", [255, 0, 0, 255]), ("normal", [0, 0, 255, 255])],
    );
    let compositor = compositor(store);

    let out = compositor
        .compose(&test_frame(), &AnalysisResult::empty(16, 12), &filter)
        .await
        .unwrap();
    assert_eq!(out.pixel(5, 5), Some([0, 0, 255, 255]));
}

#[tokio::test]
async fn test_missing_filter_passes_source_through() {
    let store = Arc::new(InMemoryAssetStore::new());
    let filter = full_frame_filter(&InMemoryAssetStore::new(), "ghost", &[("normal", [0, 0, 0, 255])]);
    let compositor = compositor(store);
    let source = test_frame();
    let analysis = AnalysisResult::empty(16, 12);

    let err = compositor
        .compose(&source, &analysis, &filter)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CompositionError::AssetLoadFailed(FilterLoadError::NotFound("ghost".to_string()))
    );

    let (out, err) = compositor
        .compose_or_passthrough(&source, &analysis, &filter)
        .await;
    assert!(err.is_some());
    assert_eq!(out.pixels(), source.pixels());
}

#[tokio::test]
async fn test_builtin_filters_degrade_without_detections() {
    let store = Arc::new(EmbeddedAssetStore::new());
    let catalog = FilterCatalog::discover(store.as_ref()).unwrap();
    let cache = Arc::new(FilterAssetCache::new(store, 8 << 20));
    let compositor = FilterCompositor::new(cache, CompositorOptions::default());
    let source = test_frame();

    for id in ["cat-ears", "pink-streaks"] {
        let filter = catalog.get(id).unwrap();
        let out = compositor
            .compose(&source, &AnalysisResult::empty(16, 12), filter)
            .await
            .unwrap();
        assert_eq!(out.dimensions(), source.dimensions());
        assert_eq!(out.pixels(), source.pixels(), "filter {}", id);
    }
}

#[tokio::test]
async fn test_builtin_filters_apply_to_portrait() {
    let store = Arc::new(EmbeddedAssetStore::new());
    let catalog = FilterCatalog::discover(store.as_ref()).unwrap();
    let cache = Arc::new(FilterAssetCache::new(store, 8 << 20));
    let compositor = FilterCompositor::new(cache, CompositorOptions::default());

    let source = DecodedFrame::from_image(&RgbaImage::from_pixel(
        160,
        120,
        image::Rgba([120, 110, 100, 255]),
    ));
    let client = AnalysisClient::new(
        Arc::new(FixedAnalysisService::portrait()),
        Duration::from_secs(1),
    );
    let analysis = client.analyze(&source).await.unwrap();
    assert!(analysis.has_detections());

    for filter in catalog.iter() {
        let out = compositor.compose(&source, &analysis, filter).await.unwrap();
        assert_eq!(out.dimensions(), (160, 120));
        assert_ne!(out.pixels(), source.pixels(), "filter {} had no effect", filter.id);
    }
}
