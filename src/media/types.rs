// SPDX-License-Identifier: GPL-3.0-only

//! Frame types shared by every pipeline stage

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Pixel format of a raw camera frame
///
/// Only the 4:2:0 luma/chroma layouts are converted. The other variants are
/// recognized so a misconfigured source reports a precise reason instead of a
/// generic layout error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Flexible 4:2:0 - Y, U and V planes with independent row/pixel strides
    /// (U and V may alias one interleaved buffer with pixel stride 2)
    Yuv420,
    /// NV12 - Y plane + interleaved UV plane
    Nv12,
    /// NV21 - Y plane + interleaved VU plane (default camera preview format)
    Nv21,
    /// YUYV - packed 4:2:2
    Yuyv,
    /// RGBA - already interleaved
    Rgba,
    /// JPEG - compressed still
    Jpeg,
    /// Vendor format code this pipeline does not know about
    Unknown(u32),
}

impl PixelFormat {
    /// Check if the converter can handle this format
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Yuv420 | Self::Nv12 | Self::Nv21)
    }

    /// Number of planes a frame in this format must carry
    pub fn plane_count(&self) -> Option<usize> {
        match self {
            Self::Yuv420 => Some(3),
            Self::Nv12 | Self::Nv21 => Some(2),
            Self::Yuyv | Self::Rgba | Self::Jpeg => Some(1),
            Self::Unknown(_) => None,
        }
    }

    /// Parse a FourCC-style format name
    pub fn from_fourcc(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "YUV420" | "YUV_420_888" | "I420" | "YV12" => Self::Yuv420,
            "NV12" => Self::Nv12,
            "NV21" => Self::Nv21,
            "YUYV" | "YUY2" => Self::Yuyv,
            "RGBA" => Self::Rgba,
            "JPEG" | "MJPG" => Self::Jpeg,
            _ => Self::Unknown(fourcc_code(name)),
        }
    }
}

fn fourcc_code(name: &str) -> u32 {
    name.bytes()
        .take(4)
        .fold(0u32, |code, byte| (code << 8) | byte as u32)
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yuv420 => write!(f, "YUV420"),
            Self::Nv12 => write!(f, "NV12"),
            Self::Nv21 => write!(f, "NV21"),
            Self::Yuyv => write!(f, "YUYV"),
            Self::Rgba => write!(f, "RGBA"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Unknown(code) => write!(f, "unknown(0x{:08x})", code),
        }
    }
}

/// One plane of a raw frame
///
/// A plane is a view into a buffer owned by the frame source. Several planes
/// may view the same buffer, which is how interleaved chroma is exposed as
/// separate U and V planes with pixel stride 2.
#[derive(Clone)]
pub struct FramePlane {
    buffer: Arc<[u8]>,
    offset: usize,
    row_stride: usize,
    pixel_stride: usize,
}

impl FramePlane {
    /// Create a plane starting at the beginning of `buffer`
    pub fn new(buffer: Arc<[u8]>, row_stride: usize, pixel_stride: usize) -> Self {
        Self::with_offset(buffer, 0, row_stride, pixel_stride)
    }

    /// Create a plane starting `offset` bytes into `buffer`
    pub fn with_offset(
        buffer: Arc<[u8]>,
        offset: usize,
        row_stride: usize,
        pixel_stride: usize,
    ) -> Self {
        Self {
            buffer,
            offset,
            row_stride,
            pixel_stride,
        }
    }

    /// Bytes from the plane start to the end of the backing buffer
    pub fn bytes(&self) -> &[u8] {
        self.buffer.get(self.offset..).unwrap_or(&[])
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Check if both planes view the same backing buffer
    pub fn shares_buffer_with(&self, other: &FramePlane) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Bytes needed to address `rows` rows of `cols` samples
    ///
    /// `None` when the strides put the last sample beyond `usize`.
    pub fn required_len(&self, cols: usize, rows: usize) -> Option<usize> {
        if cols == 0 || rows == 0 {
            return Some(0);
        }
        (rows - 1)
            .checked_mul(self.row_stride)?
            .checked_add((cols - 1).checked_mul(self.pixel_stride)?)?
            .checked_add(1)
    }
}

impl std::fmt::Debug for FramePlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePlane")
            .field("len", &self.bytes().len())
            .field("offset", &self.offset)
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

/// A single unconverted frame from the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Luma plane first, then chroma plane(s)
    pub planes: Vec<FramePlane>,
    /// Monotonic sequence number assigned by the frame source
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<FramePlane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Interleaved RGBA8 frame ready for compositing and display
///
/// Pixels are shared behind an `Arc` so the preview, the latest-frame slot
/// and a capture snapshot can all hold the same buffer. The buffer length is
/// always `width * height * 4`.
#[derive(Clone)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
    sequence: u64,
    captured_at: Instant,
}

impl DecodedFrame {
    /// Wrap an RGBA buffer, returning `None` if its length does not match
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        Self::from_shared(width, height, Arc::new(pixels))
    }

    pub(crate) fn from_shared(width: u32, height: u32, pixels: Arc<Vec<u8>>) -> Option<Self> {
        if pixels.len() != rgba_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// Build a frame from a decoded image
    pub fn from_image(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: Arc::new(image.as_raw().clone()),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Carry timing metadata over from the frame this one was derived from
    pub(crate) fn with_origin(mut self, sequence: u64, captured_at: Instant) -> Self {
        self.sequence = sequence;
        self.captured_at = captured_at;
        self
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

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// RGBA value at (x, y), or `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels
            .get(idx..idx + 4)
            .and_then(|px| px.try_into().ok())
    }

    /// Check if both frames hold the same pixel buffer
    pub fn shares_buffer_with(&self, other: &DecodedFrame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Copy into an `image` buffer (for encoding snapshots)
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.as_ref().clone())
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Length of an RGBA8 buffer for the given dimensions
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
