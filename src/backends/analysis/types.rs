// SPDX-License-Identifier: MPL-2.0

//! Analysis result types
//!
//! All geometry is normalized (0.0 to 1.0) relative to the analyzed frame so
//! results stay valid when the compositor works at another resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

/// A point in normalized frame space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    /// 0.0 = left of frame, 1.0 = right of frame
    pub x: f32,
    /// 0.0 = top of frame, 1.0 = bottom of frame
    pub y: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Create a point from pixel coordinates, clamped into the frame
    pub fn from_pixels(x: f32, y: f32, frame_width: u32, frame_height: u32) -> Self {
        Self {
            x: (x / frame_width.max(1) as f32).clamp(0.0, 1.0),
            y: (y / frame_height.max(1) as f32).clamp(0.0, 1.0),
        }
    }

    /// Position in pixels for a frame of the given size
    pub fn to_pixels(self, frame_width: u32, frame_height: u32) -> (f32, f32) {
        (self.x * frame_width as f32, self.y * frame_height as f32)
    }
}

/// Named facial and hairline landmarks
///
/// Left and right are in image space (as the frame is stored), not from the
/// subject's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LandmarkKind {
    LeftEye,
    RightEye,
    NoseTip,
    MouthCenter,
    HairlineTop,
    HairlineLeft,
    HairlineRight,
}

impl LandmarkKind {
    pub const ALL: [LandmarkKind; 7] = [
        LandmarkKind::LeftEye,
        LandmarkKind::RightEye,
        LandmarkKind::NoseTip,
        LandmarkKind::MouthCenter,
        LandmarkKind::HairlineTop,
        LandmarkKind::HairlineLeft,
        LandmarkKind::HairlineRight,
    ];
}

/// Sparse set of detected landmarks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    points: BTreeMap<LandmarkKind, NormalizedPoint>,
}

impl Landmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: LandmarkKind, point: NormalizedPoint) {
        self.points.insert(kind, point);
    }

    pub fn get(&self, kind: LandmarkKind) -> Option<NormalizedPoint> {
        self.points.get(&kind).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LandmarkKind, NormalizedPoint)> + '_ {
        self.points.iter().map(|(kind, point)| (*kind, *point))
    }
}

impl FromIterator<(LandmarkKind, NormalizedPoint)> for Landmarks {
    fn from_iter<I: IntoIterator<Item = (LandmarkKind, NormalizedPoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        Self {
            x: x / fw,
            y: y / fh,
            width: width / fw,
            height: height / fh,
        }
    }

    pub fn center(&self) -> NormalizedPoint {
        NormalizedPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// (x, y, width, height) in pixels for a frame of the given size
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (f32, f32, f32, f32) {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        (self.x * fw, self.y * fh, self.width * fw, self.height * fh)
    }
}

/// Single-channel coverage mask (0 = outside, 255 = fully inside)
///
/// The mask may be smaller than the frame; it covers the whole frame and is
/// sampled by nearest neighbour.
#[derive(Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    data: Arc<Vec<u8>>,
}

impl SegmentationMask {
    /// Wrap mask data, returning `None` for zero sizes or a length mismatch
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::new(data),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Coverage at mask coordinate (x, y)
    pub fn value(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Coverage for pixel (x, y) of a frame of the given size
    pub fn sample_for_frame(&self, x: u32, y: u32, frame_width: u32, frame_height: u32) -> u8 {
        let mx = (x as u64 * self.width as u64 / frame_width.max(1) as u64) as u32;
        let my = (y as u64 * self.height as u64 / frame_height.max(1) as u64) as u32;
        self.value(mx.min(self.width - 1), my.min(self.height - 1))
    }

    /// Normalized bounding box of samples at or above `threshold`
    pub fn bounds(&self, threshold: u8) -> Option<FrameRegion> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;

        for (idx, &value) in self.data.iter().enumerate() {
            if value < threshold {
                continue;
            }
            let x = (idx % self.width as usize) as u32;
            let y = (idx / self.width as usize) as u32;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        if min_x == u32::MAX {
            return None;
        }

        Some(FrameRegion::from_pixels(
            min_x as f32,
            min_y as f32,
            (max_x - min_x + 1) as f32,
            (max_y - min_y + 1) as f32,
            self.width,
            self.height,
        ))
    }
}

impl std::fmt::Debug for SegmentationMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationMask")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Hair length class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HairLength {
    Short,
    Medium,
    Long,
    #[default]
    Unknown,
}

/// Attributes derived from the hair region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HairAttributes {
    pub length: HairLength,
    /// Dominant hair color estimate (RGB)
    pub color: [u8; 3],
    /// Texture score in [0, 1] (0 = straight, 1 = coily)
    pub texture_score: f32,
    /// Volume score in [0, 1]
    pub volume_score: f32,
}

impl Default for HairAttributes {
    fn default() -> Self {
        Self {
            length: HairLength::Unknown,
            color: [0, 0, 0],
            texture_score: 0.0,
            volume_score: 0.0,
        }
    }
}

/// Structured output of one analyzed frame
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Hair segmentation mask
    pub mask: Option<SegmentationMask>,
    /// Detected landmarks (may be empty)
    pub landmarks: Landmarks,
    /// Face bounding box
    pub bounding_box: Option<FrameRegion>,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
    pub hair: Option<HairAttributes>,
    /// Size of the frame that was analyzed
    pub frame_size: (u32, u32),
    /// Sequence number of the analyzed frame
    pub sequence: u64,
}

impl AnalysisResult {
    /// A result with nothing detected
    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self {
            mask: None,
            landmarks: Landmarks::new(),
            bounding_box: None,
            confidence: 0.0,
            hair: None,
            frame_size: (frame_width, frame_height),
            sequence: 0,
        }
    }

    /// Check if anything was detected at all
    pub fn has_detections(&self) -> bool {
        self.mask.is_some() || !self.landmarks.is_empty() || self.bounding_box.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_pixels_clamps() {
        let p = NormalizedPoint::from_pixels(-10.0, 500.0, 100, 400);
        assert_eq!(p, NormalizedPoint::new(0.0, 1.0));

        let p = NormalizedPoint::from_pixels(25.0, 100.0, 100, 400);
        assert_eq!(p, NormalizedPoint::new(0.25, 0.25));
    }

    #[test]
    fn test_region_from_pixels() {
        let region = FrameRegion::from_pixels(10.0, 20.0, 50.0, 40.0, 100, 200);
        assert_eq!(region, FrameRegion::new(0.1, 0.1, 0.5, 0.2));
        let center = region.center();
        assert!((center.x - 0.35).abs() < 1e-6);
        assert!((center.y - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mask_rejects_bad_sizes() {
        assert!(SegmentationMask::new(0, 4, vec![]).is_none());
        assert!(SegmentationMask::new(2, 2, vec![0; 3]).is_none());
        assert!(SegmentationMask::new(2, 2, vec![0; 4]).is_some());
    }

    #[test]
    fn test_mask_bounds() {
        #[rustfmt::skip]
        let data = vec![
            0, 0,   0,   0,
            0, 255, 200, 0,
            0, 0,   0,   0,
            0, 0,   0,   0,
        ];
        let mask = SegmentationMask::new(4, 4, data).unwrap();
        let bounds = mask.bounds(128).unwrap();
        assert_eq!(bounds, FrameRegion::new(0.25, 0.25, 0.5, 0.25));
        assert!(mask.bounds(255).is_some());

        let empty = SegmentationMask::new(2, 2, vec![0; 4]).unwrap();
        assert!(empty.bounds(1).is_none());
    }

    #[test]
    fn test_mask_nearest_sampling() {
        let mask = SegmentationMask::new(2, 1, vec![0, 255]).unwrap();
        assert_eq!(mask.sample_for_frame(0, 0, 8, 4), 0);
        assert_eq!(mask.sample_for_frame(3, 3, 8, 4), 0);
        assert_eq!(mask.sample_for_frame(4, 0, 8, 4), 255);
        assert_eq!(mask.sample_for_frame(7, 3, 8, 4), 255);
    }
}
