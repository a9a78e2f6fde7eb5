// SPDX-License-Identifier: MPL-2.0

//! Analysis service boundary
//!
//! The face/hair analysis engine is an external collaborator. It receives a
//! decoded RGBA frame and answers in pixel coordinates of that frame:
//!
//! ```text
//! DecodedFrame ─► AnalysisService::analyze ─► ServiceOutput (pixels)
//!                                                 │
//!                 AnalysisClient (timeout, validation, normalization)
//!                                                 │
//!                                                 ▼
//!                                    AnalysisResult (normalized)
//! ```
//!
//! # Modules
//!
//! - [`types`]: normalized result types consumed by the compositor
//! - [`client`]: async adapter with timeout and output validation
//! - [`fixed`]: canned-output service used when no engine is available

pub mod client;
pub mod fixed;
pub mod types;

pub use client::AnalysisClient;
pub use fixed::FixedAnalysisService;
pub use types::{
    AnalysisResult, FrameRegion, HairAttributes, HairLength, LandmarkKind, Landmarks,
    NormalizedPoint, SegmentationMask,
};

use crate::errors::AnalysisError;
use crate::media::types::DecodedFrame;

/// Raw mask as produced by the service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Service answer in pixel coordinates of the analyzed frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceOutput {
    /// Landmark positions as (x, y) pixels
    pub landmarks: Vec<(LandmarkKind, [f32; 2])>,
    /// Face box as (x, y, width, height) pixels
    pub bounding_box: Option<[f32; 4]>,
    pub confidence: f32,
    pub mask: Option<ServiceMask>,
    pub hair: Option<HairAttributes>,
}

/// Failure signal reported by the service itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceFailure {
    /// Engine not loaded, accelerator busy, or similar
    Unavailable(String),
    /// Engine ran but failed
    Internal(String),
}

impl From<ServiceFailure> for AnalysisError {
    fn from(failure: ServiceFailure) -> Self {
        match failure {
            ServiceFailure::Unavailable(msg) => AnalysisError::ServiceUnavailable(msg),
            ServiceFailure::Internal(msg) => {
                AnalysisError::ServiceUnavailable(format!("internal failure: {}", msg))
            }
        }
    }
}

/// External face/hair analysis engine
///
/// Implementations may block; the client always calls them from the
/// blocking thread pool.
pub trait AnalysisService: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Analyze one frame
    fn analyze(&self, frame: &DecodedFrame) -> Result<ServiceOutput, ServiceFailure>;
}
