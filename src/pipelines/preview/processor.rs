// SPDX-License-Identifier: GPL-3.0-only

//! One pipeline cycle: convert, analyze, composite, mirror
//!
//! CPU-heavy stages run on the blocking pool so the worker task never stalls
//! the async runtime. The processor remembers the last good analysis result
//! and reuses it when the service fails.

use crate::backends::analysis::{AnalysisClient, AnalysisResult};
use crate::errors::{AnalysisError, CompositionError, ConversionError};
use crate::filters::{FilterCompositor, FilterDefinition};
use crate::media::types::{DecodedFrame, RawFrame};
use crate::media::yuv_converter::FrameConverter;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Wall time spent in each stage of a cycle
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CycleTimings {
    pub(crate) convert: Duration,
    pub(crate) analyze: Duration,
    pub(crate) compose: Duration,
    pub(crate) total: Duration,
}

impl CycleTimings {
    fn ms(d: Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }

    pub(crate) fn log_over_budget(&self, sequence: u64, budget: Duration) {
        debug!(
            sequence,
            budget_ms = Self::ms(budget),
            total_ms = Self::ms(self.total),
            convert_ms = Self::ms(self.convert),
            analyze_ms = Self::ms(self.analyze),
            compose_ms = Self::ms(self.compose),
            "Frame over budget"
        );
    }
}

/// Result of one cycle
pub(crate) enum CycleOutcome {
    Published {
        frame: DecodedFrame,
        /// Fresh analysis, `None` when the service failed this cycle
        analysis: Option<AnalysisResult>,
        analysis_error: Option<AnalysisError>,
        composition_error: Option<CompositionError>,
        timings: CycleTimings,
    },
    /// The frame could not be converted and was dropped
    Dropped(ConversionError),
    /// The runtime is shutting down
    Cancelled,
}

pub(crate) struct FrameProcessor {
    converter: Arc<Mutex<FrameConverter>>,
    analysis: AnalysisClient,
    compositor: FilterCompositor,
    mirror: bool,
    last_result: Option<AnalysisResult>,
}

impl FrameProcessor {
    pub(crate) fn new(
        converter: Arc<Mutex<FrameConverter>>,
        analysis: AnalysisClient,
        compositor: FilterCompositor,
        mirror: bool,
    ) -> Self {
        Self {
            converter,
            analysis,
            compositor,
            mirror,
            last_result: None,
        }
    }

    pub(crate) async fn run_cycle(
        &mut self,
        raw: RawFrame,
        filter: Option<&FilterDefinition>,
    ) -> CycleOutcome {
        let started = Instant::now();
        let mut timings = CycleTimings::default();
        let sequence = raw.sequence;

        // Convert
        let converter = Arc::clone(&self.converter);
        let converted = tokio::task::spawn_blocking(move || {
            converter
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .convert(&raw)
        })
        .await;
        let decoded = match converted {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return CycleOutcome::Dropped(e),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => return CycleOutcome::Cancelled,
        };
        timings.convert = started.elapsed();

        // Analyze
        let analyze_start = Instant::now();
        let (analysis, analysis_error) = match self.analysis.analyze(&decoded).await {
            Ok(result) => {
                self.last_result = Some(result.clone());
                (Some(result), None)
            }
            Err(e) => (None, Some(e)),
        };
        timings.analyze = analyze_start.elapsed();

        // Composite
        let compose_start = Instant::now();
        let (composed, composition_error) = match filter {
            Some(filter) => {
                let fallback;
                let current = match analysis.as_ref().or(self.last_result.as_ref()) {
                    Some(result) => result,
                    None => {
                        fallback = AnalysisResult::empty(decoded.width(), decoded.height());
                        &fallback
                    }
                };
                self.compositor
                    .compose_or_passthrough(&decoded, current, filter)
                    .await
            }
            None => (decoded, None),
        };

        let frame = if self.mirror {
            self.compositor.mirror(&composed)
        } else {
            composed
        };
        timings.compose = compose_start.elapsed();
        timings.total = started.elapsed();

        trace!(
            sequence,
            total_us = timings.total.as_micros() as u64,
            filtered = filter.is_some(),
            "Cycle complete"
        );

        CycleOutcome::Published {
            frame,
            analysis,
            analysis_error,
            composition_error,
            timings,
        }
    }

    /// Release converter and compositor scratch memory
    pub(crate) fn release_scratch(&mut self) {
        self.converter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear_pool();
        self.compositor.release_scratch();
    }
}
