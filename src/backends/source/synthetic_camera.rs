// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera driven by a still image
//!
//! Encodes the image once into the requested YUV layout and hands a fresh
//! `RawFrame` (new sequence number and capture time, same backing planes) to
//! the sink at a fixed rate. Stands in for a camera driver in the CLI and in
//! tests.

use super::FrameSink;
use super::frame_loop::{CaptureLoopController, LoopAction};
use crate::constants::{StreamResolution, timing};
use crate::media::synthetic::{SyntheticLayout, encode_rgba};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Synthetic camera settings
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCameraOptions {
    pub layout: SyntheticLayout,
    /// Frames per second (clamped to 1..=MAX_STREAM_FPS)
    pub fps: u32,
    /// Extra bytes appended to each plane row
    pub row_padding: usize,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for SyntheticCameraOptions {
    fn default() -> Self {
        Self {
            layout: SyntheticLayout::Nv21,
            fps: timing::DEFAULT_STREAM_FPS,
            row_padding: 0,
            max_frames: None,
        }
    }
}

/// A running synthetic frame source
pub struct SyntheticCamera {
    controller: CaptureLoopController,
    sent: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
}

impl SyntheticCamera {
    /// Start streaming `image` into `sink`
    pub fn start(
        image: &RgbaImage,
        options: SyntheticCameraOptions,
        sink: Arc<dyn FrameSink>,
    ) -> io::Result<Self> {
        let (width, height) = image.dimensions();
        let template = encode_rgba(
            width,
            height,
            image.as_raw(),
            options.layout,
            options.row_padding,
        );

        let fps = options.fps.clamp(1, timing::MAX_STREAM_FPS);
        let interval = Duration::from_secs_f64(1.0 / fps as f64);

        info!(
            width,
            height,
            fps,
            layout = ?options.layout,
            "Starting synthetic camera"
        );

        let sent = Arc::new(AtomicU64::new(0));
        let accepted = Arc::new(AtomicU64::new(0));
        let loop_sent = Arc::clone(&sent);
        let loop_accepted = Arc::clone(&accepted);
        let max_frames = options.max_frames;

        let controller =
            CaptureLoopController::start_paced("synthetic-camera", interval, move || {
                let sequence = loop_sent.fetch_add(1, Ordering::Relaxed);
                if max_frames.is_some_and(|max| sequence >= max) {
                    loop_sent.fetch_sub(1, Ordering::Relaxed);
                    return LoopAction::Stop;
                }

                let mut frame = template.clone().with_sequence(sequence);
                frame.captured_at = Instant::now();
                if sink.push_frame(frame) {
                    loop_accepted.fetch_add(1, Ordering::Relaxed);
                }
                LoopAction::Continue
            })?;

        Ok(Self {
            controller,
            sent,
            accepted,
        })
    }

    /// Frames handed to the sink so far
    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Frames the sink accepted
    pub fn frames_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Stop the camera and wait for its thread
    pub fn stop(&mut self) {
        self.controller.stop();
        debug!(frames = self.frames_sent(), "Synthetic camera stopped");
    }

    /// Wait until the camera stops on its own (`max_frames` reached)
    pub fn join(&mut self) {
        self.controller.join();
    }
}

/// Scale an image down so its larger side fits the preset
///
/// Images already within the preset are returned unchanged.
pub fn fit_to_resolution(image: &RgbaImage, resolution: StreamResolution) -> RgbaImage {
    let (w, h) = image.dimensions();
    let max = resolution.max_dimension();
    if w.max(h) <= max {
        return image.clone();
    }

    let scale = max as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::{PixelFormat, RawFrame};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        frames: Mutex<Vec<RawFrame>>,
    }

    impl FrameSink for Collect {
        fn push_frame(&self, frame: RawFrame) -> bool {
            self.frames.lock().unwrap().push(frame);
            true
        }
    }

    #[test]
    fn test_emits_numbered_frames() {
        let image = RgbaImage::from_pixel(8, 6, image::Rgba([200, 100, 50, 255]));
        let sink = Arc::new(Collect::default());

        let mut camera = SyntheticCamera::start(
            &image,
            SyntheticCameraOptions {
                layout: SyntheticLayout::I420,
                fps: 200,
                row_padding: 0,
                max_frames: Some(5),
            },
            sink.clone(),
        )
        .unwrap();
        camera.join();

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(camera.frames_sent(), 5);
        assert_eq!(camera.frames_accepted(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
            assert_eq!(frame.format, PixelFormat::Yuv420);
            assert_eq!((frame.width, frame.height), (8, 6));
        }
    }

    #[test]
    fn test_rejected_frames_are_counted() {
        let image = RgbaImage::new(4, 4);
        let sink: Arc<dyn FrameSink> = Arc::new(|_frame: RawFrame| false);

        let mut camera = SyntheticCamera::start(
            &image,
            SyntheticCameraOptions {
                max_frames: Some(3),
                fps: 200,
                ..Default::default()
            },
            sink,
        )
        .unwrap();
        camera.join();

        assert_eq!(camera.frames_sent(), 3);
        assert_eq!(camera.frames_accepted(), 0);
    }

    #[test]
    fn test_fit_to_resolution() {
        let image = RgbaImage::new(2000, 1000);
        let scaled = fit_to_resolution(&image, StreamResolution::Sd);
        assert_eq!(scaled.dimensions(), (640, 320));

        let small = RgbaImage::new(100, 50);
        assert_eq!(
            fit_to_resolution(&small, StreamResolution::Sd).dimensions(),
            (100, 50)
        );
    }
}
