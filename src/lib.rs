// SPDX-License-Identifier: MPL-2.0

//! Stylecam - real-time face and hair style filters for camera frames
//!
//! This library provides the frame pipeline behind the Stylecam camera:
//! YUV frame conversion, the analysis service boundary, filter asset
//! caching and compositing, and the live preview coordinator.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`media`]: Frame types, buffer pooling and YUV to RGBA conversion
//! - [`backends`]: Analysis service, asset stores and frame sources
//! - [`filters`]: Filter definitions, asset cache and compositor
//! - [`pipelines`]: Live preview pipeline and its state machine
//! - [`config`]: User configuration handling
//! - [`errors`]: Typed errors for every stage
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(EmbeddedAssetStore::new());
//! let cache = Arc::new(FilterAssetCache::new(store, config.cache_budget_bytes));
//! let pipeline = Pipeline::new(config, Arc::new(FixedAnalysisService::portrait()), cache);
//! pipeline.start()?;
//! pipeline.submit_frame(raw_frame);
//! let preview = pipeline.subscribe_frames();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod media;
pub mod pipelines;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use filters::{FilterAssetCache, FilterCatalog, FilterCompositor, FilterDefinition};
pub use media::{DecodedFrame, FrameConverter, PixelFormat, RawFrame};
pub use pipelines::{FailureReason, Pipeline, PipelineState, PipelineStats};
