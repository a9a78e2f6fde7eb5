// SPDX-License-Identifier: MPL-2.0

//! YUV 4:2:0 to RGBA conversion for camera preview frames
//!
//! Converts NV12, NV21 and flexible three-plane YUV 4:2:0 frames into
//! interleaved RGBA8 using BT.601 limited-range fixed-point coefficients.
//!
//! ```text
//! luma row ──────────────┐
//!                        ├─► pairwise decode ─► pooled RGBA buffer
//! chroma row ─► scratch ─┘
//!   (block copy when the chroma is already interleaved,
//!    strided gather otherwise)
//! ```
//!
//! Every chroma row is staged once as interleaved (U,V) pairs and shared by
//! the two luma rows that use it. When the source already stores chroma as
//! an interleaved run (NV12/NV21, or U and V planes aliasing one buffer with
//! pixel stride 2) the staging is a single `copy_from_slice` per row.

use crate::errors::ConversionError;
use crate::media::pool::{FramePool, PoolStats};
use crate::media::types::{DecodedFrame, FramePlane, PixelFormat, RawFrame};
use tracing::{debug, trace};

/// Where the chroma samples of a frame live
enum ChromaLayout<'a> {
    /// One plane holding (U,V) or (V,U) pairs back to back
    Interleaved {
        plane: &'a FramePlane,
        u_first: bool,
    },
    /// Separate U and V planes with arbitrary strides
    Planar {
        u: &'a FramePlane,
        v: &'a FramePlane,
    },
}

/// Frame buffer converter
///
/// Owns the output buffer pool and the row scratch space; both are reused
/// across calls so steady-state conversion does not allocate.
pub struct FrameConverter {
    pool: FramePool,
    chroma_row: Vec<u8>,
    luma_row: Vec<u8>,
}

impl FrameConverter {
    /// Create a converter keeping up to `buffers_per_size` output buffers per size
    pub fn new(buffers_per_size: usize) -> Self {
        Self {
            pool: FramePool::new(buffers_per_size),
            chroma_row: Vec::new(),
            luma_row: Vec::new(),
        }
    }

    /// Convert a raw camera frame to RGBA
    ///
    /// Converting the same frame twice produces identical pixels.
    pub fn convert(&mut self, frame: &RawFrame) -> Result<DecodedFrame, ConversionError> {
        let start = std::time::Instant::now();

        if !frame.format.is_supported() {
            return Err(ConversionError::UnsupportedFormat(frame.format));
        }

        let (luma, chroma) = resolve_layout(frame)?;
        let width = frame.width as usize;
        let height = frame.height as usize;

        let Self {
            pool,
            chroma_row,
            luma_row,
        } = self;

        let pixels = pool.checkout(frame.width, frame.height, |out| {
            convert_rows(luma, &chroma, width, height, chroma_row, luma_row, out);
            Ok::<(), ConversionError>(())
        })?;

        let decoded = DecodedFrame::from_shared(frame.width, frame.height, pixels)
            .ok_or_else(|| {
                ConversionError::InvalidPlaneLayout("output buffer size mismatch".to_string())
            })?
            .with_origin(frame.sequence, frame.captured_at);

        trace!(
            width = frame.width,
            height = frame.height,
            format = %frame.format,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Converted frame"
        );

        Ok(decoded)
    }

    /// Release pooled buffers (called when the pipeline pauses)
    pub fn clear_pool(&mut self) {
        let stats = self.pool.stats();
        debug!(
            buckets = stats.buckets,
            pooled_bytes = stats.pooled_bytes,
            "Clearing converter buffer pool"
        );
        self.pool.clear();
        self.chroma_row = Vec::new();
        self.luma_row = Vec::new();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Validate planes against the frame geometry and pick the chroma layout
fn resolve_layout(frame: &RawFrame) -> Result<(&FramePlane, ChromaLayout<'_>), ConversionError> {
    let invalid = |msg: String| ConversionError::InvalidPlaneLayout(msg);

    if frame.width == 0 || frame.height == 0 {
        return Err(invalid(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }

    let expected = frame.format.plane_count().unwrap_or(0);
    if frame.planes.len() != expected {
        return Err(invalid(format!(
            "{} expects {} planes, got {}",
            frame.format,
            expected,
            frame.planes.len()
        )));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);

    let luma = &frame.planes[0];
    check_plane("luma", luma, width, height)?;

    let chroma = match frame.format {
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let plane = &frame.planes[1];
            if plane.pixel_stride() != 2 {
                return Err(invalid(format!(
                    "interleaved chroma needs pixel stride 2, got {}",
                    plane.pixel_stride()
                )));
            }
            if !interleaved_fits(plane, chroma_width, chroma_height) {
                return Err(invalid(format!(
                    "chroma plane too small: stride {} for {}x{} pairs in {} bytes",
                    plane.row_stride(),
                    chroma_width,
                    chroma_height,
                    plane.bytes().len()
                )));
            }
            ChromaLayout::Interleaved {
                plane,
                u_first: frame.format == PixelFormat::Nv12,
            }
        }
        _ => {
            let u = &frame.planes[1];
            let v = &frame.planes[2];
            match aliased_interleaved(u, v, chroma_width, chroma_height) {
                Some(layout) => layout,
                None => {
                    check_plane("u", u, chroma_width, chroma_height)?;
                    check_plane("v", v, chroma_width, chroma_height)?;
                    ChromaLayout::Planar { u, v }
                }
            }
        }
    };

    Ok((luma, chroma))
}

fn check_plane(
    name: &str,
    plane: &FramePlane,
    cols: usize,
    rows: usize,
) -> Result<(), ConversionError> {
    if plane.pixel_stride() == 0 {
        return Err(ConversionError::InvalidPlaneLayout(format!(
            "{} plane has zero pixel stride",
            name
        )));
    }
    let Some(required) = plane.required_len(cols, rows) else {
        return Err(ConversionError::InvalidPlaneLayout(format!(
            "{} plane strides {}/{} overflow for {}x{} samples",
            name,
            plane.row_stride(),
            plane.pixel_stride(),
            cols,
            rows
        )));
    };
    // required_len(cols, 1) cannot overflow once the full extent did not
    let min_stride = plane.required_len(cols, 1).unwrap_or(usize::MAX);
    if plane.row_stride() < min_stride {
        return Err(ConversionError::InvalidPlaneLayout(format!(
            "{} plane row stride {} shorter than row of {} samples",
            name,
            plane.row_stride(),
            cols
        )));
    }
    if plane.bytes().len() < required {
        return Err(ConversionError::InvalidPlaneLayout(format!(
            "{} plane holds {} bytes, needs {}",
            name,
            plane.bytes().len(),
            required
        )));
    }
    Ok(())
}

fn interleaved_fits(plane: &FramePlane, pairs: usize, rows: usize) -> bool {
    let Some(row_bytes) = pairs.checked_mul(2) else {
        return false;
    };
    let needed = (rows - 1)
        .checked_mul(plane.row_stride())
        .and_then(|n| n.checked_add(row_bytes));
    plane.row_stride() >= row_bytes && needed.is_some_and(|n| plane.bytes().len() >= n)
}

/// Detect U and V planes that are really one interleaved buffer
///
/// Camera stacks commonly expose NV21/NV12 memory as three planes where U
/// and V point one byte apart into the same buffer with pixel stride 2.
fn aliased_interleaved<'a>(
    u: &'a FramePlane,
    v: &'a FramePlane,
    pairs: usize,
    rows: usize,
) -> Option<ChromaLayout<'a>> {
    if u.pixel_stride() != 2
        || v.pixel_stride() != 2
        || u.row_stride() != v.row_stride()
        || !u.shares_buffer_with(v)
    {
        return None;
    }

    let (plane, u_first) = if u.offset() + 1 == v.offset() {
        (u, true)
    } else if v.offset() + 1 == u.offset() {
        (v, false)
    } else {
        return None;
    };

    interleaved_fits(plane, pairs, rows).then_some(ChromaLayout::Interleaved { plane, u_first })
}

/// Decode every row into `out` (validated layout, cannot go out of bounds)
fn convert_rows(
    luma: &FramePlane,
    chroma: &ChromaLayout<'_>,
    width: usize,
    height: usize,
    chroma_row: &mut Vec<u8>,
    luma_row: &mut Vec<u8>,
    out: &mut [u8],
) {
    let pairs = width.div_ceil(2);
    chroma_row.resize(pairs * 2, 0);

    let luma_bytes = luma.bytes();
    let out_pixels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(out);
    let mut staged_row = usize::MAX;

    for (row, dst) in out_pixels.chunks_exact_mut(width).enumerate().take(height) {
        let chroma_y = row / 2;
        if chroma_y != staged_row {
            stage_chroma_row(chroma, chroma_y, pairs, chroma_row);
            staged_row = chroma_y;
        }

        let y_start = row * luma.row_stride();
        let y_row: &[u8] = if luma.pixel_stride() == 1 {
            &luma_bytes[y_start..y_start + width]
        } else {
            luma_row.clear();
            luma_row.extend((0..width).map(|x| luma_bytes[y_start + x * luma.pixel_stride()]));
            luma_row.as_slice()
        };

        let u_first = match chroma {
            ChromaLayout::Interleaved { u_first, .. } => *u_first,
            ChromaLayout::Planar { .. } => true,
        };

        for ((dst_pair, y_pair), uv) in dst
            .chunks_mut(2)
            .zip(y_row.chunks(2))
            .zip(chroma_row.chunks_exact(2))
        {
            let (u, v) = if u_first {
                (uv[0], uv[1])
            } else {
                (uv[1], uv[0])
            };
            let terms = ChromaTerms::new(u, v);
            for (px, &y) in dst_pair.iter_mut().zip(y_pair) {
                *px = terms.apply(y);
            }
        }
    }
}

/// Copy one chroma row into `scratch` as interleaved pairs
fn stage_chroma_row(chroma: &ChromaLayout<'_>, row: usize, pairs: usize, scratch: &mut [u8]) {
    match chroma {
        ChromaLayout::Interleaved { plane, .. } => {
            let start = row * plane.row_stride();
            scratch.copy_from_slice(&plane.bytes()[start..start + pairs * 2]);
        }
        ChromaLayout::Planar { u, v } => {
            let u_bytes = u.bytes();
            let v_bytes = v.bytes();
            let u_start = row * u.row_stride();
            let v_start = row * v.row_stride();
            for (x, pair) in scratch.chunks_exact_mut(2).enumerate() {
                pair[0] = u_bytes[u_start + x * u.pixel_stride()];
                pair[1] = v_bytes[v_start + x * v.pixel_stride()];
            }
        }
    }
}

/// Chroma contributions shared by the two pixels of a pair
///
/// BT.601 limited range in 7-bit fixed point:
/// R = 1.164(Y-16) + 1.596V, G = 1.164(Y-16) - 0.392U - 0.813V,
/// B = 1.164(Y-16) + 2.017U
#[derive(Clone, Copy)]
struct ChromaTerms {
    r_v: i32,
    g_uv: i32,
    b_u: i32,
}

impl ChromaTerms {
    #[inline]
    fn new(u: u8, v: u8) -> Self {
        let u = u as i32 - 128;
        let v = v as i32 - 128;
        Self {
            r_v: (204 * v) >> 7,
            g_uv: ((50 * u) >> 7) + ((104 * v) >> 7),
            b_u: (258 * u) >> 7,
        }
    }

    #[inline]
    fn apply(self, y: u8) -> [u8; 4] {
        let luma = ((y as i32 - 16) * 149) >> 7;
        [
            (luma + self.r_v).clamp(0, 255) as u8,
            (luma - self.g_uv).clamp(0, 255) as u8,
            (luma + self.b_u).clamp(0, 255) as u8,
            255,
        ]
    }
}
