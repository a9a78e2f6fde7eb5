// SPDX-License-Identifier: MPL-2.0

//! Frame processing pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │ Preview Pipeline  │ ──▶ │  Observers   │
//! │ (NV21/YUV)   │     │  - YUV→RGBA       │     │  (UI, CLI)   │
//! │              │     │  - Analysis       │     │              │
//! │              │     │  - Filters        │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Non-blocking**: Producers never wait on the worker
//! 2. **Latest wins**: Slow cycles drop stale frames instead of queueing them
//! 3. **Graceful degradation**: Analysis or filter failures fall back to
//!    the previous result or the unfiltered frame
//!
//! # Modules
//!
//! - [`preview`]: Live preview pipeline and its state machine

pub mod preview;

pub use preview::{FailureReason, Pipeline, PipelineState, PipelineStats};
