// SPDX-License-Identifier: MPL-2.0

//! Error types for the frame pipeline
//!
//! Every stage returns its own typed error. None of them are fatal on their
//! own: the pipeline coordinator decides per kind whether a failure drops a
//! single frame or moves the session into the failed state.

use crate::media::types::PixelFormat;
use std::fmt;
use std::time::Duration;

/// Result type alias used by the command line front-end
pub type AppResult<T> = Result<T, AppError>;

/// Frame conversion errors (fatal for one frame only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Pixel format is recognized but cannot be converted
    UnsupportedFormat(PixelFormat),
    /// Plane count, strides or buffer sizes do not describe the frame
    InvalidPlaneLayout(String),
}

/// Analysis service errors (recoverable per frame)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The service refused or could not run the request
    ServiceUnavailable(String),
    /// The service did not answer within the configured bound
    Timeout(Duration),
    /// The service answered with data that violates its output contract
    MalformedOutput(String),
}

/// Asset store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Requested entry does not exist
    NotFound(String),
    /// Underlying read failed
    Io(String),
    /// Path escapes the store or is otherwise unusable
    InvalidPath(String),
}

/// Filter asset loading errors (callers fall back to no filter)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterLoadError {
    /// No filter with this id exists in the asset store
    NotFound(String),
    /// The filter metadata could not be parsed or failed validation
    CorruptMetadata { filter_id: String, reason: String },
    /// A layer references an image the store does not have
    MissingLayerImage { filter_id: String, image: String },
    /// A layer image exists but could not be decoded
    UndecodableLayerImage {
        filter_id: String,
        image: String,
        reason: String,
    },
    /// The asset store failed for another reason
    Storage(StorageError),
}

/// Compositing errors (the source frame is passed through instead)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    /// The filter's assets could not be loaded
    AssetLoadFailed(FilterLoadError),
    /// Frame, mask or layer dimensions cannot be reconciled
    IncompatibleDimensions {
        frame: (u32, u32),
        other: (u32, u32),
    },
}

/// Illegal pipeline lifecycle requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The requested action is not allowed from the current state
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    /// `start()` was called outside a tokio runtime
    NoRuntime,
}

/// Umbrella error for the command line front-end
#[derive(Debug, Clone)]
pub enum AppError {
    Pipeline(PipelineError),
    Storage(StorageError),
    /// Configuration errors
    Config(String),
    /// Image decode/encode errors
    Image(String),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::UnsupportedFormat(format) => {
                write!(f, "Unsupported pixel format: {}", format)
            }
            ConversionError::InvalidPlaneLayout(msg) => write!(f, "Invalid plane layout: {}", msg),
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::ServiceUnavailable(msg) => {
                write!(f, "Analysis service unavailable: {}", msg)
            }
            AnalysisError::Timeout(after) => {
                write!(f, "Analysis timed out after {} ms", after.as_millis())
            }
            AnalysisError::MalformedOutput(msg) => write!(f, "Malformed analysis output: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(path) => write!(f, "Asset not found: {}", path),
            StorageError::Io(msg) => write!(f, "Asset I/O error: {}", msg),
            StorageError::InvalidPath(path) => write!(f, "Invalid asset path: {}", path),
        }
    }
}

impl fmt::Display for FilterLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterLoadError::NotFound(id) => write!(f, "Filter not found: {}", id),
            FilterLoadError::CorruptMetadata { filter_id, reason } => {
                write!(f, "Corrupt metadata for filter {}: {}", filter_id, reason)
            }
            FilterLoadError::MissingLayerImage { filter_id, image } => {
                write!(f, "Filter {} is missing layer image {}", filter_id, image)
            }
            FilterLoadError::UndecodableLayerImage {
                filter_id,
                image,
                reason,
            } => write!(
                f,
                "Filter {} layer image {} could not be decoded: {}",
                filter_id, image, reason
            ),
            FilterLoadError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionError::AssetLoadFailed(e) => write!(f, "Filter assets unavailable: {}", e),
            CompositionError::IncompatibleDimensions { frame, other } => write!(
                f,
                "Incompatible dimensions: frame is {}x{}, got {}x{}",
                frame.0, frame.1, other.0, other.1
            ),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} a pipeline that is {}", action, from)
            }
            PipelineError::NoRuntime => write!(f, "Pipeline must be started inside a tokio runtime"),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Image(msg) => write!(f, "Image error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConversionError {}
impl std::error::Error for AnalysisError {}
impl std::error::Error for StorageError {}
impl std::error::Error for FilterLoadError {}
impl std::error::Error for CompositionError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for AppError {}

impl From<StorageError> for FilterLoadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => FilterLoadError::NotFound(id),
            other => FilterLoadError::Storage(other),
        }
    }
}

impl From<FilterLoadError> for CompositionError {
    fn from(err: FilterLoadError) -> Self {
        CompositionError::AssetLoadFailed(err)
    }
}

// Conversions used by the command line front-end
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::Io(err.to_string()))
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_filter_not_found() {
        let err: FilterLoadError = StorageError::NotFound("sparkle".into()).into();
        assert_eq!(err, FilterLoadError::NotFound("sparkle".into()));

        let err: FilterLoadError = StorageError::Io("disk gone".into()).into();
        assert!(matches!(err, FilterLoadError::Storage(StorageError::Io(_))));
    }

    #[test]
    fn test_display_messages() {
        let err = ConversionError::UnsupportedFormat(PixelFormat::Yuyv);
        assert_eq!(err.to_string(), "Unsupported pixel format: YUYV");

        let err = AnalysisError::Timeout(Duration::from_millis(150));
        assert_eq!(err.to_string(), "Analysis timed out after 150 ms");

        let err = PipelineError::InvalidTransition {
            from: "failed",
            action: "start",
        };
        assert_eq!(err.to_string(), "Cannot start a pipeline that is failed");
    }

    fn discover_missing() -> AppResult<()> {
        let listing: Result<(), StorageError> = Err(StorageError::NotFound("filters".into()));
        listing?;
        Ok(())
    }

    fn start_outside_runtime() -> AppResult<()> {
        let started: Result<(), PipelineError> = Err(PipelineError::NoRuntime);
        started?;
        Ok(())
    }

    #[test]
    fn test_front_end_errors_convert() {
        assert!(matches!(
            discover_missing(),
            Err(AppError::Storage(StorageError::NotFound(_)))
        ));
        assert!(matches!(
            start_outside_runtime(),
            Err(AppError::Pipeline(PipelineError::NoRuntime))
        ));

        let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, AppError::Storage(StorageError::Io(_))));

        let missing: AppError = "Pipeline published no frame".into();
        assert_eq!(missing.to_string(), "Pipeline published no frame");
    }
}
