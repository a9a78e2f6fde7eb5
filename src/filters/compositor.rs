// SPDX-License-Identifier: GPL-3.0-only

//! Filter compositor
//!
//! Renders a filter's layers over a decoded frame:
//!
//! ```text
//! source RGBA ─► f32 canvas ─► layer 1 ─► layer 2 ─► ... ─► round to RGBA
//!                                 │
//!                    placement (landmarks / mask / fixed rect)
//!                    bilinear sample, opacity, mask clip, blend
//! ```
//!
//! Layers whose anchors were not detected are skipped. With no applicable
//! layer the source frame is returned as is (same buffer). All blending is
//! done on the f32 canvas and quantized once at the end.

use super::assets::FilterAssets;
use super::blend::blend_pixel;
use super::cache::FilterAssetCache;
use super::definition::{Anchor, FilterDefinition, FilterLayer};
use super::placement::{Placement, place_layer};
use crate::backends::analysis::{AnalysisResult, SegmentationMask};
use crate::errors::{CompositionError, FilterLoadError};
use crate::media::pool::FramePool;
use crate::media::types::DecodedFrame;
use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

/// Relative aspect ratio difference tolerated between mask and frame
const MASK_ASPECT_TOLERANCE: f32 = 0.01;

/// Compositor tuning
#[derive(Debug, Clone, Copy)]
pub struct CompositorOptions {
    /// Mask coverage at or above which a sample counts as inside the region
    pub mask_threshold: u8,
    /// Output buffers kept per frame size
    pub buffers_per_size: usize,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            mask_threshold: crate::constants::DEFAULT_MASK_THRESHOLD,
            buffers_per_size: crate::constants::DEFAULT_POOL_BUFFERS_PER_SIZE,
        }
    }
}

/// Scratch state reused across frames
struct Scratch {
    canvas: Vec<[f32; 3]>,
    pool: FramePool,
}

/// Composites filters over frames
///
/// Cheap to clone; clones share the asset cache and scratch buffers.
#[derive(Clone)]
pub struct FilterCompositor {
    cache: Arc<FilterAssetCache>,
    scratch: Arc<Mutex<Scratch>>,
    options: CompositorOptions,
}

impl FilterCompositor {
    pub fn new(cache: Arc<FilterAssetCache>, options: CompositorOptions) -> Self {
        Self {
            cache,
            scratch: Arc::new(Mutex::new(Scratch {
                canvas: Vec::new(),
                pool: FramePool::new(options.buffers_per_size),
            })),
            options,
        }
    }

    pub fn cache(&self) -> &Arc<FilterAssetCache> {
        &self.cache
    }

    fn scratch(&self) -> MutexGuard<'_, Scratch> {
        self.scratch.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Composite `filter` over `source`
    ///
    /// Loads the filter's assets through the cache, then renders on the
    /// blocking pool.
    pub async fn compose(
        &self,
        source: &DecodedFrame,
        analysis: &AnalysisResult,
        filter: &FilterDefinition,
    ) -> Result<DecodedFrame, CompositionError> {
        let assets = self.cache.load(&filter.id).await?;

        let this = self.clone();
        let source = source.clone();
        let analysis = analysis.clone();
        let filter = filter.clone();

        let fallback = source.clone();
        match tokio::task::spawn_blocking(move || {
            this.compose_with_assets(&source, &analysis, &filter, &assets)
        })
        .await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                // Runtime shutting down
                debug!(error = %e, "Composition task cancelled");
                Ok(fallback)
            }
        }
    }

    /// Composite, falling back to the unmodified source on any error
    ///
    /// The error (if any) is returned alongside for reporting.
    pub async fn compose_or_passthrough(
        &self,
        source: &DecodedFrame,
        analysis: &AnalysisResult,
        filter: &FilterDefinition,
    ) -> (DecodedFrame, Option<CompositionError>) {
        match self.compose(source, analysis, filter).await {
            Ok(frame) => (frame, None),
            Err(e) => {
                warn!(filter = %filter.id, error = %e, "Compositing failed, showing unfiltered frame");
                (source.clone(), Some(e))
            }
        }
    }

    /// Composite with assets that are already loaded
    pub fn compose_with_assets(
        &self,
        source: &DecodedFrame,
        analysis: &AnalysisResult,
        filter: &FilterDefinition,
        assets: &FilterAssets,
    ) -> Result<DecodedFrame, CompositionError> {
        let start = std::time::Instant::now();
        let (fw, fh) = source.dimensions();

        let uses_mask = filter
            .layers
            .iter()
            .any(|layer| matches!(layer.anchor, Anchor::Hair { .. }));
        if uses_mask && let Some(mask) = &analysis.mask {
            check_mask_aspect(mask, fw, fh)?;
        }

        let mut planned: Vec<(&FilterLayer, &RgbaImage, Placement)> = Vec::new();
        for layer in &filter.layers {
            let image = assets.image(&layer.image).ok_or_else(|| {
                CompositionError::AssetLoadFailed(FilterLoadError::MissingLayerImage {
                    filter_id: filter.id.clone(),
                    image: layer.image.clone(),
                })
            })?;

            if layer.opacity <= 0.0 {
                continue;
            }

            match place_layer(
                &layer.anchor,
                analysis,
                image.dimensions(),
                (fw, fh),
                self.options.mask_threshold,
            ) {
                Some(placement) => planned.push((layer, image.as_ref(), placement)),
                None => trace!(filter = %filter.id, image = %layer.image, "Layer anchor not detected, skipping"),
            }
        }

        if planned.is_empty() {
            trace!(filter = %filter.id, "No applicable layers, passing frame through");
            return Ok(source.clone());
        }

        let mut scratch = self.scratch();
        let Scratch { canvas, pool } = &mut *scratch;

        canvas.clear();
        canvas.extend(
            source
                .pixels()
                .chunks_exact(4)
                .map(|px| [to_unit(px[0]), to_unit(px[1]), to_unit(px[2])]),
        );

        for (layer, image, placement) in &planned {
            let clip = match layer.anchor {
                Anchor::Hair { clip_to_mask, .. } if clip_to_mask => analysis.mask.as_ref(),
                _ => None,
            };
            draw_layer(canvas, (fw, fh), layer, image, placement, clip);
        }

        let pixels = pool
            .checkout(fw, fh, |out| {
                for (dst, src) in out.chunks_exact_mut(4).zip(canvas.iter()) {
                    dst[0] = to_byte(src[0]);
                    dst[1] = to_byte(src[1]);
                    dst[2] = to_byte(src[2]);
                    dst[3] = 255;
                }
                Ok::<(), CompositionError>(())
            })?;

        let frame = DecodedFrame::from_shared(fw, fh, pixels)
            .ok_or(CompositionError::IncompatibleDimensions {
                frame: (fw, fh),
                other: (fw, fh),
            })?
            .with_origin(source.sequence(), source.captured_at());

        trace!(
            filter = %filter.id,
            layers = planned.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Composited frame"
        );
        Ok(frame)
    }

    /// Flip a frame horizontally (selfie preview)
    pub fn mirror(&self, frame: &DecodedFrame) -> DecodedFrame {
        let (w, h) = frame.dimensions();
        let row_len = w as usize * 4;
        let mut scratch = self.scratch();

        let mirrored = scratch.pool.checkout(w, h, |out| {
            for (dst_row, src_row) in out
                .chunks_exact_mut(row_len)
                .zip(frame.pixels().chunks_exact(row_len))
            {
                for (dst, src) in dst_row
                    .chunks_exact_mut(4)
                    .zip(src_row.chunks_exact(4).rev())
                {
                    dst.copy_from_slice(src);
                }
            }
            Ok::<(), ()>(())
        });

        match mirrored.ok().and_then(|px| DecodedFrame::from_shared(w, h, px)) {
            Some(out) => out.with_origin(frame.sequence(), frame.captured_at()),
            None => frame.clone(),
        }
    }

    /// Release the canvas and pooled output buffers
    pub fn release_scratch(&self) {
        let mut scratch = self.scratch();
        scratch.canvas = Vec::new();
        scratch.pool.clear();
    }
}

#[inline]
fn to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn check_mask_aspect(
    mask: &SegmentationMask,
    frame_width: u32,
    frame_height: u32,
) -> Result<(), CompositionError> {
    let frame_aspect = frame_width as f32 / frame_height.max(1) as f32;
    // Width the mask would have at exactly the frame's aspect
    let expected_width = mask.height() as f32 * frame_aspect;
    let tolerance = (expected_width * MASK_ASPECT_TOLERANCE).max(1.0);

    if (mask.width() as f32 - expected_width).abs() > tolerance {
        return Err(CompositionError::IncompatibleDimensions {
            frame: (frame_width, frame_height),
            other: mask.dimensions(),
        });
    }
    Ok(())
}

/// Blend one placed layer into the canvas
fn draw_layer(
    canvas: &mut [[f32; 3]],
    frame_size: (u32, u32),
    layer: &FilterLayer,
    image: &RgbaImage,
    placement: &Placement,
    clip: Option<&SegmentationMask>,
) {
    let (fw, fh) = frame_size;
    let Some((x0, y0, x1, y1)) = placement.pixel_bounds(fw, fh) else {
        return;
    };
    let (sin, cos) = placement.rotation.sin_cos();
    let (iw, ih) = (image.width() as f32, image.height() as f32);

    for y in y0..y1 {
        let row = y as usize * fw as usize;
        for x in x0..x1 {
            let (u, v) = placement.to_layer(x as f32 + 0.5, y as f32 + 0.5, sin, cos);
            if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                continue;
            }

            let (color, mut alpha) = sample_bilinear(image, u * iw - 0.5, v * ih - 0.5);
            alpha *= layer.opacity;
            if let Some(mask) = clip {
                alpha *= to_unit(mask.sample_for_frame(x, y, fw, fh));
            }
            if alpha <= 0.0 {
                continue;
            }

            blend_pixel(layer.blend, &mut canvas[row + x as usize], color, alpha);
        }
    }
}

/// Bilinear sample in premultiplied space, clamped to the image edge.
/// Returns straight color and alpha.
fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> ([f32; 3], f32) {
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;

    let mut acc = [0.0f32; 4];
    for (dx, dy, weight) in [
        (0, 0, (1.0 - tx) * (1.0 - ty)),
        (1, 0, tx * (1.0 - ty)),
        (0, 1, (1.0 - tx) * ty),
        (1, 1, tx * ty),
    ] {
        if weight <= 0.0 {
            continue;
        }
        let sx = (x0 as i64 + dx).clamp(0, max_x) as u32;
        let sy = (y0 as i64 + dy).clamp(0, max_y) as u32;
        let px = image.get_pixel(sx, sy).0;
        let a = to_unit(px[3]) * weight;
        acc[0] += to_unit(px[0]) * a;
        acc[1] += to_unit(px[1]) * a;
        acc[2] += to_unit(px[2]) * a;
        acc[3] += a;
    }

    if acc[3] <= f32::EPSILON {
        return ([0.0; 3], 0.0);
    }
    (
        [acc[0] / acc[3], acc[1] / acc[3], acc[2] / acc[3]],
        acc[3].min(1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::analysis::{FrameRegion, LandmarkKind, NormalizedPoint};
    use crate::backends::assets::InMemoryAssetStore;
    use crate::filters::definition::{BlendMode, FaceFeature, FilterCategory};
    use std::collections::HashMap;

    fn compositor() -> FilterCompositor {
        let cache = FilterAssetCache::new(Arc::new(InMemoryAssetStore::new()), 1 << 20);
        FilterCompositor::new(Arc::new(cache), CompositorOptions::default())
    }

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> DecodedFrame {
        let pixels = (0..w * h).flat_map(|_| [rgb[0], rgb[1], rgb[2], 255]).collect();
        DecodedFrame::from_rgba(w, h, pixels).unwrap()
    }

    fn single_layer(anchor: Anchor, blend: BlendMode) -> FilterDefinition {
        FilterDefinition {
            id: "test".to_string(),
            name: "Test".to_string(),
            category: FilterCategory::Combo,
            layers: vec![FilterLayer {
                image: "layer.png".to_string(),
                blend,
                opacity: 1.0,
                anchor,
            }],
        }
    }

    fn assets_for(def: &FilterDefinition, layer: RgbaImage) -> FilterAssets {
        let mut images = HashMap::new();
        images.insert("layer.png".to_string(), Arc::new(layer));
        FilterAssets::from_parts(def.clone(), images)
    }

    fn full_frame() -> Anchor {
        Anchor::Fixed {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    #[test]
    fn test_opaque_white_screen_is_white() {
        let def = single_layer(full_frame(), BlendMode::Screen);
        let assets = assets_for(&def, RgbaImage::from_pixel(4, 4, image::Rgba([255; 4])));
        let source = solid_frame(8, 6, [12, 100, 200]);

        let out = compositor()
            .compose_with_assets(&source, &AnalysisResult::empty(8, 6), &def, &assets)
            .unwrap();
        assert_eq!(out.dimensions(), (8, 6));
        assert!(out.pixels().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_transparent_layer_is_identity() {
        for blend in [
            BlendMode::Normal,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Multiply,
        ] {
            let def = single_layer(full_frame(), blend);
            let assets = assets_for(&def, RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 0])));
            let source = solid_frame(5, 5, [1, 128, 254]);

            let out = compositor()
                .compose_with_assets(&source, &AnalysisResult::empty(5, 5), &def, &assets)
                .unwrap();
            assert_eq!(out.pixels(), source.pixels());
        }
    }

    #[test]
    fn test_missing_landmarks_pass_through() {
        let anchor = Anchor::Face {
            feature: FaceFeature::Eyes,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        let def = single_layer(anchor, BlendMode::Normal);
        let assets = assets_for(&def, RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255])));
        let source = solid_frame(10, 10, [50, 50, 50]);

        let out = compositor()
            .compose_with_assets(&source, &AnalysisResult::empty(10, 10), &def, &assets)
            .unwrap();
        assert!(out.shares_buffer_with(&source));
    }

    #[test]
    fn test_face_layer_lands_between_eyes() {
        let anchor = Anchor::Face {
            feature: FaceFeature::Eyes,
            scale: 0.2,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        let def = single_layer(anchor, BlendMode::Normal);
        let assets = assets_for(&def, RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255])));
        let source = solid_frame(100, 100, [0, 0, 0]);

        let mut analysis = AnalysisResult::empty(100, 100);
        analysis
            .landmarks
            .insert(LandmarkKind::LeftEye, NormalizedPoint::new(0.3, 0.5));
        analysis
            .landmarks
            .insert(LandmarkKind::RightEye, NormalizedPoint::new(0.7, 0.5));
        analysis.bounding_box = Some(FrameRegion::new(0.0, 0.0, 1.0, 1.0));

        let out = compositor()
            .compose_with_assets(&source, &analysis, &def, &assets)
            .unwrap();
        // 20x20 layer centred at (50, 50)
        assert_eq!(out.pixel(50, 50), Some([255, 0, 0, 255]));
        assert_eq!(out.pixel(45, 45), Some([255, 0, 0, 255]));
        assert_eq!(out.pixel(10, 10), Some([0, 0, 0, 255]));
        assert_eq!(out.pixel(50, 75), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_hair_layer_clips_to_mask() {
        let anchor = Anchor::Hair {
            clip_to_mask: true,
            scale: 1.0,
        };
        let def = single_layer(anchor, BlendMode::Normal);
        let assets = assets_for(&def, RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255])));
        let source = solid_frame(4, 4, [0, 0, 0]);

        // Left half of the frame is hair
        #[rustfmt::skip]
        let mask = vec![
            255, 255, 0, 0,
            255, 255, 0, 0,
            255, 255, 0, 0,
            255, 255, 0, 0,
        ];
        let mut analysis = AnalysisResult::empty(4, 4);
        analysis.mask = SegmentationMask::new(4, 4, mask);

        let out = compositor()
            .compose_with_assets(&source, &analysis, &def, &assets)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(out.pixel(1, 3), Some([0, 0, 255, 255]));
        assert_eq!(out.pixel(2, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.pixel(3, 3), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_mask_aspect_mismatch() {
        let anchor = Anchor::Hair {
            clip_to_mask: false,
            scale: 1.0,
        };
        let def = single_layer(anchor, BlendMode::Normal);
        let assets = assets_for(&def, RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255])));
        let source = solid_frame(64, 48, [0, 0, 0]);

        let mut analysis = AnalysisResult::empty(64, 48);
        analysis.mask = SegmentationMask::new(10, 10, vec![255; 100]);

        let err = compositor()
            .compose_with_assets(&source, &analysis, &def, &assets)
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::IncompatibleDimensions {
                frame: (64, 48),
                other: (10, 10)
            }
        );
    }

    #[test]
    fn test_layers_apply_in_order() {
        let mut def = single_layer(full_frame(), BlendMode::Normal);
        def.layers.push(FilterLayer {
            image: "second.png".to_string(),
            blend: BlendMode::Multiply,
            opacity: 1.0,
            anchor: full_frame(),
        });
        let mut images = HashMap::new();
        images.insert(
            "layer.png".to_string(),
            Arc::new(RgbaImage::from_pixel(2, 2, image::Rgba([200, 200, 200, 255]))),
        );
        images.insert(
            "second.png".to_string(),
            Arc::new(RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 255, 255]))),
        );
        let assets = FilterAssets::from_parts(def.clone(), images);

        let out = compositor()
            .compose_with_assets(&solid_frame(3, 3, [10, 10, 10]), &AnalysisResult::empty(3, 3), &def, &assets)
            .unwrap();
        assert_eq!(out.pixel(1, 1), Some([200, 0, 200, 255]));
    }

    #[test]
    fn test_mirror() {
        let frame = DecodedFrame::from_rgba(2, 1, vec![1, 2, 3, 255, 4, 5, 6, 255]).unwrap();
        let mirrored = compositor().mirror(&frame);
        assert_eq!(mirrored.pixels(), &[4, 5, 6, 255, 1, 2, 3, 255]);
    }

    #[tokio::test]
    async fn test_missing_filter_passes_through() {
        let def = single_layer(full_frame(), BlendMode::Normal);
        let source = solid_frame(4, 4, [9, 9, 9]);

        let (out, err) = compositor()
            .compose_or_passthrough(&source, &AnalysisResult::empty(4, 4), &def)
            .await;
        assert!(out.shares_buffer_with(&source));
        assert_eq!(
            err,
            Some(CompositionError::AssetLoadFailed(FilterLoadError::NotFound(
                "test".to_string()
            )))
        );
    }
}
