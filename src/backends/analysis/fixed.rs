// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-output analysis service
//!
//! Stands in for the analysis engine when none is linked in. Returns the
//! same canned answer for every frame, optionally rescaled from a reference
//! frame size, with configurable latency and scripted failures.

use super::types::{HairAttributes, HairLength, LandmarkKind};
use super::{AnalysisService, ServiceFailure, ServiceMask, ServiceOutput};
use crate::media::types::DecodedFrame;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::trace;

/// Reference frame size of [`FixedAnalysisService::portrait`]
const PORTRAIT_SIZE: (u32, u32) = (640, 480);
/// Mask resolution of the portrait output (same 4:3 aspect)
const PORTRAIT_MASK_SIZE: (u32, u32) = (80, 60);

/// Analysis service returning a canned answer
pub struct FixedAnalysisService {
    output: ServiceOutput,
    reference_size: Option<(u32, u32)>,
    delay: Duration,
    failures: Mutex<VecDeque<ServiceFailure>>,
    calls: AtomicUsize,
}

impl FixedAnalysisService {
    /// Always answer with `output`, in the analyzed frame's pixel space
    pub fn new(output: ServiceOutput) -> Self {
        Self {
            output,
            reference_size: None,
            delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Never detect anything
    pub fn empty() -> Self {
        Self::new(ServiceOutput::default())
    }

    /// A centred, front-facing subject with shoulder-length hair
    ///
    /// Coordinates are for a 640x480 frame and are rescaled to whatever
    /// frame is analyzed.
    pub fn portrait() -> Self {
        let landmarks = vec![
            (LandmarkKind::LeftEye, [280.0, 230.0]),
            (LandmarkKind::RightEye, [360.0, 230.0]),
            (LandmarkKind::NoseTip, [320.0, 280.0]),
            (LandmarkKind::MouthCenter, [320.0, 325.0]),
            (LandmarkKind::HairlineTop, [320.0, 145.0]),
            (LandmarkKind::HairlineLeft, [238.0, 195.0]),
            (LandmarkKind::HairlineRight, [402.0, 195.0]),
        ];

        let output = ServiceOutput {
            landmarks,
            bounding_box: Some([232.0, 140.0, 176.0, 230.0]),
            confidence: 0.92,
            mask: Some(portrait_hair_mask()),
            hair: Some(HairAttributes {
                length: HairLength::Medium,
                color: [92, 64, 51],
                texture_score: 0.35,
                volume_score: 0.6,
            }),
        };

        Self::new(output).with_reference_size(PORTRAIT_SIZE.0, PORTRAIT_SIZE.1)
    }

    /// Treat the canned coordinates as belonging to a frame of this size
    pub fn with_reference_size(mut self, width: u32, height: u32) -> Self {
        self.reference_size = Some((width.max(1), height.max(1)));
        self
    }

    /// Block for `delay` on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next call with `failure` (queued in order)
    pub fn fail_next(&self, failure: ServiceFailure) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(failure);
    }

    /// Number of calls served so far (including failures)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn scaled_output(&self, width: u32, height: u32) -> ServiceOutput {
        let Some((ref_w, ref_h)) = self.reference_size else {
            return self.output.clone();
        };
        if (ref_w, ref_h) == (width, height) {
            return self.output.clone();
        }

        let sx = width as f32 / ref_w as f32;
        let sy = height as f32 / ref_h as f32;

        ServiceOutput {
            landmarks: self
                .output
                .landmarks
                .iter()
                .map(|(kind, [x, y])| (*kind, [x * sx, y * sy]))
                .collect(),
            bounding_box: self
                .output
                .bounding_box
                .map(|[x, y, w, h]| [x * sx, y * sy, w * sx, h * sy]),
            confidence: self.output.confidence,
            mask: self
                .output
                .mask
                .as_ref()
                .map(|mask| resample_mask(mask, width, height)),
            hair: self.output.hair,
        }
    }
}

impl AnalysisService for FixedAnalysisService {
    fn name(&self) -> &str {
        "fixed"
    }

    fn analyze(&self, frame: &DecodedFrame) -> Result<ServiceOutput, ServiceFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(failure) = scripted {
            return Err(failure);
        }

        trace!(
            width = frame.width(),
            height = frame.height(),
            "Fixed analysis answering"
        );
        Ok(self.scaled_output(frame.width(), frame.height()))
    }
}

/// Nearest-neighbour resample so the mask keeps the frame's aspect ratio
fn resample_mask(mask: &ServiceMask, width: u32, height: u32) -> ServiceMask {
    // Keep masks coarse; the compositor samples them per pixel anyway
    let scale = (width.max(height) / 160).max(1);
    let out_w = width.div_ceil(scale).max(1);
    let out_h = height.div_ceil(scale).max(1);

    let mut data = Vec::with_capacity((out_w * out_h) as usize);
    for y in 0..out_h {
        let src_y = (y as u64 * mask.height as u64 / out_h as u64) as usize;
        for x in 0..out_w {
            let src_x = (x as u64 * mask.width as u64 / out_w as u64) as usize;
            data.push(
                mask.data
                    .get(src_y * mask.width as usize + src_x)
                    .copied()
                    .unwrap_or(0),
            );
        }
    }

    ServiceMask {
        width: out_w,
        height: out_h,
        data,
    }
}

/// Hair region above and around the portrait face: an outer ellipse minus the
/// face ellipse
fn portrait_hair_mask() -> ServiceMask {
    let (w, h) = PORTRAIT_MASK_SIZE;
    let mut data = Vec::with_capacity((w * h) as usize);

    for y in 0..h {
        for x in 0..w {
            let fx = x as f32 + 0.5;
            let fy = y as f32 + 0.5;
            let hair = ellipse(fx, fy, 40.0, 26.0, 14.0, 16.0);
            let face = ellipse(fx, fy, 40.0, 31.0, 10.0, 13.0);
            data.push(if hair && !face && fy < 40.0 { 255 } else { 0 });
        }
    }

    ServiceMask {
        width: w,
        height: h,
        data,
    }
}

fn ellipse(x: f32, y: f32, cx: f32, cy: f32, rx: f32, ry: f32) -> bool {
    let dx = (x - cx) / rx;
    let dy = (y - cy) / ry;
    dx * dx + dy * dy <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> DecodedFrame {
        DecodedFrame::from_rgba(width, height, vec![0; (width * height * 4) as usize]).unwrap()
    }

    #[test]
    fn test_portrait_scales_to_frame() {
        let service = FixedAnalysisService::portrait();
        let output = service.analyze(&frame(320, 240)).unwrap();

        let (_, [x, y]) = output.landmarks[0];
        assert_eq!((x, y), (140.0, 115.0));

        let mask = output.mask.unwrap();
        assert_eq!(mask.data.len(), (mask.width * mask.height) as usize);
        assert_eq!(mask.width * 3, mask.height * 4);
        assert!(mask.data.iter().any(|&v| v == 255));
    }

    #[test]
    fn test_reference_size_frame_is_untouched() {
        let service = FixedAnalysisService::portrait();
        let output = service.analyze(&frame(640, 480)).unwrap();
        assert_eq!(output.mask.unwrap().width, PORTRAIT_MASK_SIZE.0);
    }

    #[test]
    fn test_scripted_failures_are_consumed_in_order() {
        let service = FixedAnalysisService::empty();
        service.fail_next(ServiceFailure::Unavailable("busy".into()));
        service.fail_next(ServiceFailure::Internal("oom".into()));

        assert_eq!(
            service.analyze(&frame(2, 2)),
            Err(ServiceFailure::Unavailable("busy".into()))
        );
        assert_eq!(
            service.analyze(&frame(2, 2)),
            Err(ServiceFailure::Internal("oom".into()))
        );
        assert!(service.analyze(&frame(2, 2)).is_ok());
        assert_eq!(service.calls(), 3);
    }
}
