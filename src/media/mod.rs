// SPDX-License-Identifier: MPL-2.0

//! Frame types and color conversion
//!
//! Camera frames arrive as YUV 4:2:0 (NV21, NV12 or flexible three-plane
//! layouts) and are converted to interleaved RGBA before analysis and
//! compositing.
//!
//! # Modules
//!
//! - [`types`]: RawFrame, FramePlane, PixelFormat and DecodedFrame
//! - [`pool`]: reusable output buffers keyed by frame size
//! - [`yuv_converter`]: YUV 4:2:0 to RGBA conversion
//! - [`synthetic`]: RGBA to YUV encoder for synthetic sources and tests

pub mod pool;
pub mod synthetic;
pub mod types;
pub mod yuv_converter;

// Re-export commonly used types
pub use pool::{FramePool, PoolStats};
pub use synthetic::{SyntheticLayout, encode_rgba};
pub use types::{DecodedFrame, FramePlane, PixelFormat, RawFrame};
pub use yuv_converter::FrameConverter;
