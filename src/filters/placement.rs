// SPDX-License-Identifier: GPL-3.0-only

//! Layer placement geometry
//!
//! Turns a layer anchor plus the analysis result into a rotated rectangle in
//! frame pixels. A `None` placement means the anchor's inputs were not
//! detected and the layer is skipped.

use super::definition::{Anchor, FaceFeature};
use crate::backends::analysis::{AnalysisResult, FrameRegion, LandmarkKind};

/// Face width relative to the distance between the eyes, used when the
/// analysis has eyes but no bounding box
const FACE_WIDTH_PER_EYE_DISTANCE: f32 = 2.2;

/// A layer's rectangle on the frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub center: (f32, f32),
    pub size: (f32, f32),
    /// Clockwise rotation in radians (image space, y down)
    pub rotation: f32,
}

impl Placement {
    /// Axis-aligned placement covering a normalized frame region
    pub fn from_region(region: FrameRegion, frame_width: u32, frame_height: u32) -> Self {
        let (x, y, w, h) = region.to_pixels(frame_width, frame_height);
        Self {
            center: (x + w / 2.0, y + h / 2.0),
            size: (w, h),
            rotation: 0.0,
        }
    }

    /// Inverse mapping from a frame point to layer coordinates in [0, 1]
    #[inline]
    pub fn to_layer(&self, x: f32, y: f32, sin: f32, cos: f32) -> (f32, f32) {
        let dx = x - self.center.0;
        let dy = y - self.center.1;
        let lx = dx * cos + dy * sin;
        let ly = -dx * sin + dy * cos;
        (lx / self.size.0 + 0.5, ly / self.size.1 + 0.5)
    }

    /// Integer pixel bounds (x0, y0, x1, y1) of the rotated rectangle,
    /// clipped to the frame, exclusive end; `None` if nothing is visible
    pub fn pixel_bounds(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let (sin, cos) = self.rotation.sin_cos();
        let hw = self.size.0 / 2.0;
        let hh = self.size.1 / 2.0;
        let ex = (hw * cos).abs() + (hh * sin).abs();
        let ey = (hw * sin).abs() + (hh * cos).abs();

        let x0 = (self.center.0 - ex).floor().max(0.0);
        let y0 = (self.center.1 - ey).floor().max(0.0);
        let x1 = (self.center.0 + ex).ceil().min(frame_width as f32);
        let y1 = (self.center.1 + ey).ceil().min(frame_height as f32);

        if !(x0 < x1 && y0 < y1) {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Place a layer whose image is `image_size` pixels
pub fn place_layer(
    anchor: &Anchor,
    analysis: &AnalysisResult,
    image_size: (u32, u32),
    frame_size: (u32, u32),
    mask_threshold: u8,
) -> Option<Placement> {
    match *anchor {
        Anchor::Face {
            feature,
            scale,
            offset_x,
            offset_y,
        } => place_face(
            feature,
            scale,
            (offset_x, offset_y),
            analysis,
            image_size,
            frame_size,
        ),
        Anchor::Hair { scale, .. } => {
            let bounds = analysis.mask.as_ref()?.bounds(mask_threshold)?;
            let mut placement = Placement::from_region(bounds, frame_size.0, frame_size.1);
            placement.size.0 *= scale;
            placement.size.1 *= scale;
            Some(placement)
        }
        Anchor::Fixed {
            x,
            y,
            width,
            height,
        } => Some(Placement::from_region(
            FrameRegion::new(x, y, width, height),
            frame_size.0,
            frame_size.1,
        )),
    }
}

fn place_face(
    feature: FaceFeature,
    scale: f32,
    offset: (f32, f32),
    analysis: &AnalysisResult,
    image_size: (u32, u32),
    frame_size: (u32, u32),
) -> Option<Placement> {
    let (fw, fh) = frame_size;
    let point = |kind: LandmarkKind| analysis.landmarks.get(kind).map(|p| p.to_pixels(fw, fh));

    let eyes = point(LandmarkKind::LeftEye).zip(point(LandmarkKind::RightEye));
    let face_box = analysis.bounding_box.map(|b| b.to_pixels(fw, fh));

    let rotation = eyes
        .map(|((lx, ly), (rx, ry))| (ry - ly).atan2(rx - lx))
        .unwrap_or(0.0);

    let face_width = match (face_box, eyes) {
        (Some((_, _, w, _)), _) => w,
        (None, Some(((lx, ly), (rx, ry)))) => {
            ((rx - lx).powi(2) + (ry - ly).powi(2)).sqrt() * FACE_WIDTH_PER_EYE_DISTANCE
        }
        (None, None) => return None,
    };
    if face_width <= 0.0 {
        return None;
    }

    let anchor = match feature {
        FaceFeature::Eyes => eyes.map(|((lx, ly), (rx, ry))| ((lx + rx) / 2.0, (ly + ry) / 2.0))?,
        FaceFeature::Nose => point(LandmarkKind::NoseTip)?,
        FaceFeature::Mouth => point(LandmarkKind::MouthCenter)?,
        FaceFeature::Crown => point(LandmarkKind::HairlineTop)
            .or_else(|| face_box.map(|(x, y, w, _)| (x + w / 2.0, y)))?,
        FaceFeature::Face => face_box.map(|(x, y, w, h)| (x + w / 2.0, y + h / 2.0))?,
    };

    let width = face_width * scale;
    let height = width * image_size.1 as f32 / image_size.0.max(1) as f32;

    // Offsets follow the head tilt
    let (sin, cos) = rotation.sin_cos();
    let ox = offset.0 * width;
    let oy = offset.1 * height;
    let center = (
        anchor.0 + ox * cos - oy * sin,
        anchor.1 + ox * sin + oy * cos,
    );

    Some(Placement {
        center,
        size: (width, height),
        rotation,
    })
}
