// SPDX-License-Identifier: GPL-3.0-only

//! RGBA to YUV 4:2:0 encoder for synthetic frame sources
//!
//! Produces `RawFrame`s with the same plane layouts real camera stacks hand
//! out, so the converter and the pipeline can be driven from still images.
//! Chroma is the average of each 2x2 block (clipped at odd edges).

use crate::media::types::{FramePlane, PixelFormat, RawFrame};
use std::sync::Arc;

/// Plane layout of an encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticLayout {
    /// Y plane + interleaved VU plane
    Nv21,
    /// Y plane + interleaved UV plane
    Nv12,
    /// NV21 memory exposed as three planes (U and V alias one buffer)
    AliasedYuv420,
    /// Y, U and V planes packed one after another in one buffer
    I420,
}

impl SyntheticLayout {
    /// Parse a layout name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nv21" => Some(Self::Nv21),
            "nv12" => Some(Self::Nv12),
            "yuv420" | "aliased" => Some(Self::AliasedYuv420),
            "i420" => Some(Self::I420),
            _ => None,
        }
    }
}

/// Encode a tightly packed RGBA buffer as a raw camera frame
///
/// `row_padding` extra bytes are appended to every row of every plane to
/// mimic stride alignment.
pub fn encode_rgba(
    width: u32,
    height: u32,
    rgba: &[u8],
    layout: SyntheticLayout,
    row_padding: usize,
) -> RawFrame {
    let w = width as usize;
    let h = height as usize;
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);

    let luma_stride = w + row_padding;
    let mut luma = vec![0u8; luma_stride * h];
    for y in 0..h {
        for x in 0..w {
            let [r, g, b] = rgb_at(rgba, w, x, y);
            luma[y * luma_stride + x] = rgb_to_y(r, g, b);
        }
    }

    let chroma: Vec<(u8, u8)> = (0..ch)
        .flat_map(|cy| (0..cw).map(move |cx| (cx, cy)))
        .map(|(cx, cy)| block_chroma(rgba, w, h, cx, cy))
        .collect();

    let luma_plane = FramePlane::new(Arc::from(luma), luma_stride, 1);

    let (format, planes) = match layout {
        SyntheticLayout::Nv21 | SyntheticLayout::Nv12 | SyntheticLayout::AliasedYuv420 => {
            let u_first = layout == SyntheticLayout::Nv12;
            let stride = cw * 2 + row_padding;
            let mut interleaved = vec![0u8; stride * ch];
            for (i, &(u, v)) in chroma.iter().enumerate() {
                let idx = (i / cw) * stride + (i % cw) * 2;
                let (first, second) = if u_first { (u, v) } else { (v, u) };
                interleaved[idx] = first;
                interleaved[idx + 1] = second;
            }
            let buffer: Arc<[u8]> = Arc::from(interleaved);

            match layout {
                SyntheticLayout::AliasedYuv420 => (
                    PixelFormat::Yuv420,
                    vec![
                        luma_plane,
                        FramePlane::with_offset(Arc::clone(&buffer), 1, stride, 2),
                        FramePlane::with_offset(buffer, 0, stride, 2),
                    ],
                ),
                SyntheticLayout::Nv12 => (
                    PixelFormat::Nv12,
                    vec![luma_plane, FramePlane::new(buffer, stride, 2)],
                ),
                _ => (
                    PixelFormat::Nv21,
                    vec![luma_plane, FramePlane::new(buffer, stride, 2)],
                ),
            }
        }
        SyntheticLayout::I420 => {
            let stride = cw + row_padding;
            let plane_len = stride * ch;
            let mut packed = vec![0u8; plane_len * 2];
            for (i, &(u, v)) in chroma.iter().enumerate() {
                let idx = (i / cw) * stride + i % cw;
                packed[idx] = u;
                packed[plane_len + idx] = v;
            }
            let buffer: Arc<[u8]> = Arc::from(packed);
            (
                PixelFormat::Yuv420,
                vec![
                    luma_plane,
                    FramePlane::with_offset(Arc::clone(&buffer), 0, stride, 1),
                    FramePlane::with_offset(buffer, plane_len, stride, 1),
                ],
            )
        }
    };

    RawFrame::new(width, height, format, planes)
}

fn rgb_at(rgba: &[u8], width: usize, x: usize, y: usize) -> [u8; 3] {
    let idx = (y * width + x) * 4;
    match rgba.get(idx..idx + 3) {
        Some(px) => [px[0], px[1], px[2]],
        None => [0, 0, 0],
    }
}

fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

/// Average U and V over the 2x2 block at chroma coordinate (cx, cy)
fn block_chroma(rgba: &[u8], w: usize, h: usize, cx: usize, cy: usize) -> (u8, u8) {
    let mut u_sum = 0i32;
    let mut v_sum = 0i32;
    let mut count = 0i32;
    for y in (cy * 2)..((cy * 2 + 2).min(h)) {
        for x in (cx * 2)..((cx * 2 + 2).min(w)) {
            let [r, g, b] = rgb_at(rgba, w, x, y);
            let (r, g, b) = (r as i32, g as i32, b as i32);
            u_sum += ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            v_sum += ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            count += 1;
        }
    }
    let count = count.max(1);
    (
        ((u_sum + count / 2) / count).clamp(0, 255) as u8,
        ((v_sum + count / 2) / count).clamp(0, 255) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv21_layout() {
        let rgba = vec![255u8; 4 * 2 * 4];
        let frame = encode_rgba(4, 2, &rgba, SyntheticLayout::Nv21, 0);
        assert_eq!(frame.format, PixelFormat::Nv21);
        assert_eq!(frame.planes.len(), 2);
        assert_eq!(frame.planes[0].bytes().len(), 8);
        assert_eq!(frame.planes[1].bytes().len(), 4);
        // White: Y=235, neutral chroma
        assert!(frame.planes[0].bytes().iter().all(|&y| y == 235));
        assert!(frame.planes[1].bytes().iter().all(|&c| c == 128));
    }

    #[test]
    fn test_aliased_planes_share_buffer() {
        let rgba = vec![0u8; 6 * 4 * 4];
        let frame = encode_rgba(6, 4, &rgba, SyntheticLayout::AliasedYuv420, 2);
        assert_eq!(frame.format, PixelFormat::Yuv420);
        assert!(frame.planes[1].shares_buffer_with(&frame.planes[2]));
        assert_eq!(frame.planes[1].offset(), 1);
        assert_eq!(frame.planes[2].offset(), 0);
        assert_eq!(frame.planes[1].row_stride(), 8);
    }

    #[test]
    fn test_i420_odd_size() {
        let rgba = vec![0u8; 5 * 3 * 4];
        let frame = encode_rgba(5, 3, &rgba, SyntheticLayout::I420, 1);
        // 3x2 chroma samples, stride 4
        assert_eq!(frame.planes[1].row_stride(), 4);
        assert_eq!(frame.planes[2].offset(), 8);
        assert_eq!(frame.planes[2].bytes().len(), 8);
    }

    #[test]
    fn test_layout_names() {
        assert_eq!(SyntheticLayout::from_name("NV21"), Some(SyntheticLayout::Nv21));
        assert_eq!(SyntheticLayout::from_name("i420"), Some(SyntheticLayout::I420));
        assert_eq!(SyntheticLayout::from_name("rgb"), None);
    }
}
