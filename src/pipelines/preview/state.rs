// SPDX-License-Identifier: GPL-3.0-only

//! Session state machine and source failure policy
//!
//! ```text
//!                 start               stop
//! Uninitialized ───────► Active ◄─────────► Paused
//!                          │       start      │
//!                          │ unusable source  │
//!                          ▼                  │
//!                       Failed ◄──────────────┘
//!                          │ (worker crash)
//!                          └──── reset ────► Active
//! ```

use crate::errors::{ConversionError, PipelineError};
use crate::media::types::PixelFormat;
use std::fmt;

/// Why a session moved to `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The source keeps delivering a format the converter cannot handle
    UnsupportedSourceFormat(PixelFormat),
    /// The source keeps delivering frames whose planes do not add up
    MalformedSource { detail: String },
    /// The background worker panicked
    WorkerCrashed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UnsupportedSourceFormat(format) => {
                write!(f, "camera delivers unsupported format {}", format)
            }
            FailureReason::MalformedSource { detail } => {
                write!(f, "camera delivers malformed frames ({})", detail)
            }
            FailureReason::WorkerCrashed(msg) => write!(f, "pipeline worker crashed: {}", msg),
        }
    }
}

/// Capture session state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Uninitialized,
    Active,
    Paused,
    Failed(FailureReason),
}

impl PipelineState {
    /// Short lowercase name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Active => "active",
            PipelineState::Paused => "paused",
            PipelineState::Failed(_) => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PipelineState::Active)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            PipelineState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Resolve a lifecycle request against this state
    ///
    /// `Ok(None)` means the request is a no-op in this state.
    pub(crate) fn apply(&self, action: Lifecycle) -> Result<Option<PipelineState>, PipelineError> {
        use PipelineState::*;

        let next = match (self, action) {
            (Uninitialized | Paused, Lifecycle::Start) => Some(Active),
            (Active, Lifecycle::Start) => None,
            (Active, Lifecycle::Stop) => Some(Paused),
            (Paused, Lifecycle::Stop) => None,
            (Failed(_), Lifecycle::Reset) => Some(Active),
            _ => {
                return Err(PipelineError::InvalidTransition {
                    from: self.name(),
                    action: action.name(),
                });
            }
        };
        Ok(next)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Externally requested lifecycle changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Start,
    Stop,
    Reset,
}

impl Lifecycle {
    fn name(self) -> &'static str {
        match self {
            Lifecycle::Start => "start",
            Lifecycle::Stop => "stop",
            Lifecycle::Reset => "reset",
        }
    }
}

/// Counts consecutive conversion failures to spot an unusable source
///
/// Any successful conversion resets both counters.
#[derive(Debug)]
pub(crate) struct SourceHealth {
    max_unsupported: u32,
    max_layout: u32,
    unsupported: Option<(PixelFormat, u32)>,
    layout_failures: u32,
}

impl SourceHealth {
    pub(crate) fn new(max_unsupported: u32, max_layout: u32) -> Self {
        Self {
            max_unsupported: max_unsupported.max(1),
            max_layout: max_layout.max(1),
            unsupported: None,
            layout_failures: 0,
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.unsupported = None;
        self.layout_failures = 0;
    }

    /// Record a failed conversion; returns a reason once the source is unusable
    pub(crate) fn record_failure(&mut self, error: &ConversionError) -> Option<FailureReason> {
        match error {
            ConversionError::UnsupportedFormat(format) => {
                self.layout_failures = 0;
                let count = match self.unsupported {
                    Some((last, count)) if last == *format => count + 1,
                    _ => 1,
                };
                self.unsupported = Some((*format, count));
                (count >= self.max_unsupported)
                    .then_some(FailureReason::UnsupportedSourceFormat(*format))
            }
            ConversionError::InvalidPlaneLayout(detail) => {
                self.unsupported = None;
                self.layout_failures += 1;
                (self.layout_failures >= self.max_layout).then(|| FailureReason::MalformedSource {
                    detail: detail.clone(),
                })
            }
        }
    }
}
