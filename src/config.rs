// SPDX-License-Identifier: GPL-3.0-only

use crate::constants;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Directory name under the platform config directory
const CONFIG_DIR_NAME: &str = "stylecam";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Byte budget for decoded filter assets
    pub cache_budget_bytes: usize,
    /// Longest wait for one analysis answer, in milliseconds
    pub analysis_timeout_ms: u64,
    /// Per-frame processing budget, in milliseconds
    pub frame_budget_ms: u64,
    /// Consecutive unsupported-format frames before the session fails
    pub max_unsupported_format_failures: u32,
    /// Consecutive malformed frames before the session fails
    pub max_layout_failures: u32,
    /// Output buffers kept per frame size
    pub pool_buffers_per_size: usize,
    /// Mask coverage treated as hair
    pub mask_threshold: u8,
    /// Filter directory on disk (None = built-in filters)
    pub assets_dir: Option<PathBuf>,
    /// Filter selected when a session starts
    pub default_filter: Option<String>,
    /// Mirror published preview horizontally (selfie mode)
    pub mirror_preview: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_budget_bytes: constants::DEFAULT_CACHE_BUDGET_BYTES,
            analysis_timeout_ms: constants::DEFAULT_ANALYSIS_TIMEOUT_MS,
            frame_budget_ms: constants::DEFAULT_FRAME_BUDGET_MS,
            max_unsupported_format_failures: constants::DEFAULT_MAX_UNSUPPORTED_FORMAT_FAILURES,
            max_layout_failures: constants::DEFAULT_MAX_LAYOUT_FAILURES,
            pool_buffers_per_size: constants::DEFAULT_POOL_BUFFERS_PER_SIZE,
            mask_threshold: constants::DEFAULT_MASK_THRESHOLD,
            assets_dir: None,
            default_filter: None,
            mirror_preview: true, // Default to mirrored (selfie mode)
        }
    }
}

impl Config {
    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location
    ///
    /// Never fails: a missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No config directory on this platform, using defaults");
                Self::default()
            }
        }
    }

    /// Load from an explicit path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Config>(&text) {
            Ok(mut config) => {
                config.validate();
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("no config directory on this platform".into()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("serialize: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Replace nonsensical values with defaults
    ///
    /// Returns the names of the fields that were changed.
    pub fn validate(&mut self) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut changed = Vec::new();

        if self.cache_budget_bytes == 0 {
            self.cache_budget_bytes = defaults.cache_budget_bytes;
            changed.push("cache_budget_bytes");
        }
        if self.analysis_timeout_ms == 0 {
            self.analysis_timeout_ms = defaults.analysis_timeout_ms;
            changed.push("analysis_timeout_ms");
        }
        if self.frame_budget_ms == 0 {
            self.frame_budget_ms = defaults.frame_budget_ms;
            changed.push("frame_budget_ms");
        }
        if self.max_unsupported_format_failures == 0 {
            self.max_unsupported_format_failures = defaults.max_unsupported_format_failures;
            changed.push("max_unsupported_format_failures");
        }
        if self.max_layout_failures == 0 {
            self.max_layout_failures = defaults.max_layout_failures;
            changed.push("max_layout_failures");
        }
        if self.pool_buffers_per_size == 0 {
            self.pool_buffers_per_size = defaults.pool_buffers_per_size;
            changed.push("pool_buffers_per_size");
        }
        if self.mask_threshold == 0 {
            self.mask_threshold = defaults.mask_threshold;
            changed.push("mask_threshold");
        }

        for field in &changed {
            warn!(field, "Invalid config value replaced with default");
        }
        changed
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }
}
