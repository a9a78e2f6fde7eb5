// SPDX-License-Identifier: MPL-2.0

//! Frame source boundary
//!
//! A frame source delivers `RawFrame`s asynchronously from a single producer
//! thread into a [`FrameSink`] (normally the preview pipeline). Each frame
//! owns shared handles to its plane buffers, so the producer may reuse or
//! release its own copy as soon as `push_frame` returns.
//!
//! # Modules
//!
//! - [`frame_loop`]: producer thread lifecycle and pacing
//! - [`synthetic_camera`]: still-image camera used by the CLI and tests

pub mod frame_loop;
pub mod synthetic_camera;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use synthetic_camera::{SyntheticCamera, SyntheticCameraOptions, fit_to_resolution};

use crate::media::types::RawFrame;

/// Receiver of camera frames
pub trait FrameSink: Send + Sync {
    /// Hand over one frame; returns whether it was accepted
    fn push_frame(&self, frame: RawFrame) -> bool;
}

impl<F> FrameSink for F
where
    F: Fn(RawFrame) -> bool + Send + Sync,
{
    fn push_frame(&self, frame: RawFrame) -> bool {
        self(frame)
    }
}
