// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Metadata file every filter directory carries
pub const FILTER_METADATA_FILE: &str = "filter.json";

/// Decoded filter asset budget (64 MiB)
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 64 * 1024 * 1024;

/// Longest the pipeline waits for one analysis answer
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 150;

/// Per-frame processing budget (~30fps)
pub const DEFAULT_FRAME_BUDGET_MS: u64 = 33;

/// Consecutive unsupported-format frames before the source is declared unusable
pub const DEFAULT_MAX_UNSUPPORTED_FORMAT_FAILURES: u32 = 3;

/// Consecutive malformed-layout frames before the source is declared unusable
pub const DEFAULT_MAX_LAYOUT_FAILURES: u32 = 30;

/// Output buffers kept per frame size
pub const DEFAULT_POOL_BUFFERS_PER_SIZE: usize = 3;

/// Mask coverage at or above which a sample counts as hair
pub const DEFAULT_MASK_THRESHOLD: u8 = 128;

/// Preview quality presets for synthetic streaming
///
/// Controls the frame size the synthetic camera scales its input image to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamResolution {
    /// 640x480
    Sd,
    /// 1280x720
    #[default]
    Hd,
    /// 1920x1080
    FullHd,
}

impl StreamResolution {
    /// All presets, smallest first
    pub const ALL: [StreamResolution; 3] = [
        StreamResolution::Sd,
        StreamResolution::Hd,
        StreamResolution::FullHd,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            StreamResolution::Sd => "SD",
            StreamResolution::Hd => "720p",
            StreamResolution::FullHd => "HD",
        }
    }

    /// Largest frame dimension for this preset
    pub fn max_dimension(&self) -> u32 {
        match self {
            StreamResolution::Sd => 640,
            StreamResolution::Hd => 1280,
            StreamResolution::FullHd => 1920,
        }
    }

    /// Parse a preset name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sd" | "480p" => Some(StreamResolution::Sd),
            "hd" | "720p" => Some(StreamResolution::Hd),
            "fullhd" | "fhd" | "1080p" => Some(StreamResolution::FullHd),
            _ => None,
        }
    }
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long `stop()` waits for the worker to acknowledge
    pub const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default synthetic camera frame rate
    pub const DEFAULT_STREAM_FPS: u32 = 30;

    /// Upper bound accepted for the synthetic camera frame rate
    pub const MAX_STREAM_FPS: u32 = 240;
}

/// Supported input image formats
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
