// SPDX-License-Identifier: GPL-3.0-only

//! Analysis client
//!
//! Hands decoded frames to the analysis service on the blocking pool, bounds
//! the wait, validates the answer and translates it into normalized frame
//! space.

use super::types::{
    AnalysisResult, FrameRegion, HairAttributes, Landmarks, NormalizedPoint, SegmentationMask,
};
use super::{AnalysisService, ServiceOutput};
use crate::errors::AnalysisError;
use crate::media::types::DecodedFrame;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Async adapter around an [`AnalysisService`]
#[derive(Clone)]
pub struct AnalysisClient {
    service: Arc<dyn AnalysisService>,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(service: Arc<dyn AnalysisService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Analyze a decoded frame
    ///
    /// A timed-out call keeps running on the blocking pool; its answer is
    /// discarded. The frame's pixel buffer stays referenced until then, so
    /// the converter will not recycle it underneath the service.
    pub async fn analyze(&self, frame: &DecodedFrame) -> Result<AnalysisResult, AnalysisError> {
        let start = std::time::Instant::now();
        let service = Arc::clone(&self.service);
        let input = frame.clone();

        let task = tokio::task::spawn_blocking(move || service.analyze(&input));

        let output = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(failure))) => {
                debug!(service = self.service.name(), ?failure, "Analysis service failed");
                return Err(failure.into());
            }
            Ok(Err(e)) => {
                warn!(service = self.service.name(), error = %e, "Analysis task panicked");
                return Err(AnalysisError::ServiceUnavailable(format!(
                    "analysis task failed: {}",
                    e
                )));
            }
            Err(_) => {
                debug!(
                    service = self.service.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Analysis timed out"
                );
                return Err(AnalysisError::Timeout(self.timeout));
            }
        };

        let mut result = normalize_output(output, frame.width(), frame.height())?;
        result.sequence = frame.sequence();

        trace!(
            sequence = frame.sequence(),
            landmarks = result.landmarks.len(),
            has_mask = result.mask.is_some(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Analysis complete"
        );

        Ok(result)
    }
}

/// Validate a service answer and convert it to normalized coordinates
///
/// Landmarks outside the frame are clamped to its edge. Non-finite values,
/// a confidence outside [0, 1] or an inconsistent mask are rejected.
pub fn normalize_output(
    output: ServiceOutput,
    frame_width: u32,
    frame_height: u32,
) -> Result<AnalysisResult, AnalysisError> {
    let malformed = |msg: String| AnalysisError::MalformedOutput(msg);

    if !output.confidence.is_finite() || !(0.0..=1.0).contains(&output.confidence) {
        return Err(malformed(format!(
            "confidence {} outside [0, 1]",
            output.confidence
        )));
    }

    let mut landmarks = Landmarks::new();
    for (kind, [x, y]) in output.landmarks {
        if !x.is_finite() || !y.is_finite() {
            return Err(malformed(format!("landmark {:?} is not finite", kind)));
        }
        landmarks.insert(
            kind,
            NormalizedPoint::from_pixels(x, y, frame_width, frame_height),
        );
    }

    let bounding_box = match output.bounding_box {
        Some([x, y, w, h]) => {
            if ![x, y, w, h].iter().all(|v| v.is_finite()) {
                return Err(malformed("bounding box is not finite".to_string()));
            }
            if w <= 0.0 || h <= 0.0 {
                return Err(malformed(format!("bounding box has size {}x{}", w, h)));
            }
            Some(FrameRegion::from_pixels(
                x,
                y,
                w,
                h,
                frame_width,
                frame_height,
            ))
        }
        None => None,
    };

    let mask = match output.mask {
        Some(raw) => {
            let (width, height, len) = (raw.width, raw.height, raw.data.len());
            Some(SegmentationMask::new(raw.width, raw.height, raw.data).ok_or_else(|| {
                malformed(format!(
                    "mask {}x{} carries {} bytes",
                    width, height, len
                ))
            })?)
        }
        None => None,
    };

    let hair = match output.hair {
        Some(hair) => {
            if !hair.texture_score.is_finite() || !hair.volume_score.is_finite() {
                return Err(malformed("hair scores are not finite".to_string()));
            }
            Some(HairAttributes {
                texture_score: hair.texture_score.clamp(0.0, 1.0),
                volume_score: hair.volume_score.clamp(0.0, 1.0),
                ..hair
            })
        }
        None => None,
    };

    Ok(AnalysisResult {
        mask,
        landmarks,
        bounding_box,
        confidence: output.confidence,
        hair,
        frame_size: (frame_width, frame_height),
        sequence: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::analysis::fixed::FixedAnalysisService;
    use crate::backends::analysis::{LandmarkKind, ServiceFailure, ServiceMask};

    fn frame(width: u32, height: u32) -> DecodedFrame {
        DecodedFrame::from_rgba(width, height, vec![0; (width * height * 4) as usize]).unwrap()
    }

    fn output_with_eyes() -> ServiceOutput {
        ServiceOutput {
            landmarks: vec![
                (LandmarkKind::LeftEye, [25.0, 50.0]),
                (LandmarkKind::RightEye, [75.0, 50.0]),
            ],
            bounding_box: Some([10.0, 20.0, 80.0, 60.0]),
            confidence: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_normalizes_pixel_coordinates() {
        let result = normalize_output(output_with_eyes(), 100, 100).unwrap();
        assert_eq!(
            result.landmarks.get(LandmarkKind::LeftEye),
            Some(NormalizedPoint::new(0.25, 0.5))
        );
        let bbox = result.bounding_box.unwrap();
        assert!((bbox.x - 0.1).abs() < 1e-6);
        assert!((bbox.height - 0.6).abs() < 1e-6);
        assert_eq!(result.frame_size, (100, 100));
    }

    #[test]
    fn test_out_of_frame_landmarks_are_clamped() {
        let output = ServiceOutput {
            landmarks: vec![(LandmarkKind::HairlineTop, [50.0, -12.0])],
            confidence: 0.5,
            ..Default::default()
        };
        let result = normalize_output(output, 100, 100).unwrap();
        assert_eq!(
            result.landmarks.get(LandmarkKind::HairlineTop),
            Some(NormalizedPoint::new(0.5, 0.0))
        );
    }

    #[test]
    fn test_rejects_malformed_output() {
        let mut output = output_with_eyes();
        output.confidence = 1.5;
        assert!(matches!(
            normalize_output(output, 100, 100),
            Err(AnalysisError::MalformedOutput(_))
        ));

        let mut output = output_with_eyes();
        output.landmarks.push((LandmarkKind::NoseTip, [f32::NAN, 1.0]));
        assert!(matches!(
            normalize_output(output, 100, 100),
            Err(AnalysisError::MalformedOutput(_))
        ));

        let mut output = output_with_eyes();
        output.mask = Some(ServiceMask {
            width: 4,
            height: 4,
            data: vec![0; 15],
        });
        assert!(matches!(
            normalize_output(output, 100, 100),
            Err(AnalysisError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_hair_scores_are_clamped() {
        let mut output = output_with_eyes();
        output.hair = Some(HairAttributes {
            texture_score: 1.7,
            volume_score: -0.2,
            ..Default::default()
        });
        let hair = normalize_output(output, 10, 10).unwrap().hair.unwrap();
        assert_eq!(hair.texture_score, 1.0);
        assert_eq!(hair.volume_score, 0.0);
    }

    #[tokio::test]
    async fn test_client_tags_sequence() {
        let service = Arc::new(FixedAnalysisService::new(output_with_eyes()));
        let client = AnalysisClient::new(service, Duration::from_millis(500));
        let input = frame(100, 100).with_origin(42, std::time::Instant::now());

        let result = client.analyze(&input).await.unwrap();
        assert_eq!(result.sequence, 42);
        assert_eq!(result.landmarks.len(), 2);
    }

    #[tokio::test]
    async fn test_client_times_out() {
        let service = Arc::new(
            FixedAnalysisService::new(output_with_eyes()).with_delay(Duration::from_millis(300)),
        );
        let client = AnalysisClient::new(service, Duration::from_millis(20));

        let err = client.analyze(&frame(8, 8)).await.unwrap_err();
        assert_eq!(err, AnalysisError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_client_maps_service_failure() {
        let service = FixedAnalysisService::new(output_with_eyes());
        service.fail_next(ServiceFailure::Unavailable("model not loaded".into()));
        let client = AnalysisClient::new(Arc::new(service), Duration::from_millis(500));

        let err = client.analyze(&frame(8, 8)).await.unwrap_err();
        assert_eq!(
            err,
            AnalysisError::ServiceUnavailable("model not loaded".into())
        );
        assert!(client.analyze(&frame(8, 8)).await.is_ok());
    }
}
