// SPDX-License-Identifier: MPL-2.0

//! Filter definitions, asset caching and compositing
//!
//! ```text
//! AssetStore ──► FilterDefinition (filter.json)
//!      │                │
//!      └──► FilterAssetCache ──► FilterAssets (decoded layer images)
//!                               │
//! DecodedFrame + AnalysisResult ─► FilterCompositor ─► DecodedFrame
//! ```
//!
//! # Modules
//!
//! - [`definition`]: Filter metadata, layers, anchors and the catalog
//! - [`assets`]: Decoded images backing a filter
//! - [`cache`]: Single-flight asset cache with an LRU byte budget
//! - [`blend`]: Blend mode formulas
//! - [`placement`]: Layer geometry from landmarks, masks and fixed rects
//! - [`compositor`]: Renders a filter over a frame

pub mod assets;
pub mod blend;
pub mod cache;
pub mod compositor;
pub mod definition;
pub mod placement;

pub use assets::FilterAssets;
pub use cache::{CacheStats, FilterAssetCache, PreloadReport};
pub use compositor::{CompositorOptions, FilterCompositor};
pub use definition::{
    Anchor, BlendMode, FaceFeature, FilterCatalog, FilterCategory, FilterDefinition, FilterLayer,
};
pub use placement::{Placement, place_layer};
