// SPDX-License-Identifier: MPL-2.0

//! Live preview pipeline
//!
//! Drives each camera frame through conversion, analysis and compositing on
//! one background worker, and publishes the outcome as observable state:
//!
//! ```text
//! FrameSource ──submit_frame──► FrameSlot (keep only latest)
//!                                   │
//!                                   ▼  worker task
//!                   ┌──────── FrameProcessor ─────────┐
//!                   │ convert → analyze → composite   │
//!                   └───────────────┬─────────────────┘
//!                                   ▼
//!            watch channels: state, frame, result, selected filter
//! ```
//!
//! Per-frame failures never stop the session. Only a source that keeps
//! delivering unconvertible frames (or a crashed worker) moves the pipeline
//! to [`PipelineState::Failed`], which requires an explicit [`Pipeline::reset`].
//!
//! # Modules
//!
//! - [`state`]: session states and lifecycle rules
//! - [`stats`]: counters exposed to observers
//! - `processor`: one convert/analyze/composite cycle
//! - `slot`: keep-only-latest frame hand-off

mod processor;
mod slot;
pub mod state;
pub mod stats;

pub use state::{FailureReason, PipelineState};
pub use stats::PipelineStats;

use crate::backends::analysis::{AnalysisClient, AnalysisResult, AnalysisService};
use crate::backends::source::FrameSink;
use crate::config::Config;
use crate::constants::timing;
use crate::errors::PipelineError;
use crate::filters::{CacheStats, CompositorOptions, FilterAssetCache, FilterCompositor, FilterDefinition};
use crate::media::types::{DecodedFrame, RawFrame};
use crate::media::yuv_converter::FrameConverter;
use processor::{CycleOutcome, FrameProcessor};
use slot::FrameSlot;
use state::{Lifecycle, SourceHealth};
use stats::StatsCounters;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

/// Handles of the running worker
struct WorkerHandle {
    session: Uuid,
    stop_tx: oneshot::Sender<()>,
    /// Completes once the worker has exited
    monitor: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    active: Option<WorkerHandle>,
    /// Monitor of the most recently stopped worker
    retired: Option<JoinHandle<()>>,
}

struct Shared {
    config: Config,
    analysis: AnalysisClient,
    compositor: FilterCompositor,
    converter: Arc<Mutex<FrameConverter>>,
    slot: FrameSlot,
    stats: StatsCounters,
    state: watch::Sender<PipelineState>,
    frames: watch::Sender<Option<DecodedFrame>>,
    results: watch::Sender<Option<AnalysisResult>>,
    filter: watch::Sender<Option<FilterDefinition>>,
    control: Mutex<Control>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, session: Uuid) -> bool {
        self.control()
            .active
            .as_ref()
            .is_some_and(|w| w.session == session)
    }

    /// Whether a later session has taken over the shared scratch buffers
    fn superseded(&self, session: Uuid) -> bool {
        self.control()
            .active
            .as_ref()
            .is_some_and(|w| w.session != session)
    }

    fn submit(&self, frame: RawFrame) -> bool {
        if !self.state.borrow().is_active() {
            trace!(sequence = frame.sequence, "Pipeline not active, ignoring frame");
            return false;
        }

        StatsCounters::bump(&self.stats.accepted);
        if let Some(replaced) = self.slot.put(frame) {
            StatsCounters::bump(&self.stats.replaced);
            trace!(sequence = replaced.sequence, "Replaced pending frame");
        }
        true
    }

    /// Move the session to `Failed` unless it already ended
    fn fail(&self, session: Uuid, reason: FailureReason) {
        let mut control = self.control();
        if control.active.as_ref().map(|w| w.session) != Some(session) {
            debug!(session = %session, reason = %reason, "Ignoring failure of a finished session");
            return;
        }
        if let Some(worker) = control.active.take() {
            control.retired = Some(worker.monitor);
        }
        self.slot.clear();
        error!(session = %session, reason = %reason, "Pipeline failed");
        self.state.send_replace(PipelineState::Failed(reason));
    }

    fn spawn_worker(self: &Arc<Self>, runtime: &Handle) -> WorkerHandle {
        let session = Uuid::new_v4();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stats.set_session(session);

        let worker = runtime.spawn(run_worker(Arc::clone(self), session, stop_rx));

        // A panicking worker would otherwise leave the state stuck at Active
        let shared = Arc::clone(self);
        let monitor = runtime.spawn(async move {
            match worker.await {
                Err(e) if e.is_panic() => {
                    let msg = panic_message(e.into_panic());
                    shared.fail(session, FailureReason::WorkerCrashed(msg));
                }
                Err(e) => debug!(session = %session, error = %e, "Worker cancelled"),
                Ok(()) => {}
            }
        });

        WorkerHandle {
            session,
            stop_tx,
            monitor,
        }
    }
}

/// Live preview pipeline
///
/// Must be started from within a tokio runtime. Dropping the pipeline stops
/// its worker.
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        service: Arc<dyn AnalysisService>,
        cache: Arc<FilterAssetCache>,
    ) -> Self {
        let analysis = AnalysisClient::new(service, config.analysis_timeout());
        let compositor = FilterCompositor::new(
            cache,
            CompositorOptions {
                mask_threshold: config.mask_threshold,
                buffers_per_size: config.pool_buffers_per_size,
            },
        );
        let converter = Arc::new(Mutex::new(FrameConverter::new(config.pool_buffers_per_size)));

        Self {
            shared: Arc::new(Shared {
                config,
                analysis,
                compositor,
                converter,
                slot: FrameSlot::new(),
                stats: StatsCounters::default(),
                state: watch::Sender::new(PipelineState::Uninitialized),
                frames: watch::Sender::new(None),
                results: watch::Sender::new(None),
                filter: watch::Sender::new(None),
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Start (or resume) processing frames
    pub fn start(&self) -> Result<(), PipelineError> {
        self.transition(Lifecycle::Start)
    }

    /// Pause processing
    ///
    /// The in-flight cycle is abandoned and the pending frame discarded.
    /// Asset loads already running are left to finish and stay cached.
    pub fn stop(&self) -> Result<(), PipelineError> {
        self.transition(Lifecycle::Stop)
    }

    /// Stop and wait for the worker to release its buffers
    pub async fn stop_and_wait(&self) -> Result<(), PipelineError> {
        self.stop()?;
        let retired = self.shared.control().retired.take();
        if let Some(monitor) = retired {
            if tokio::time::timeout(timing::WORKER_STOP_TIMEOUT, monitor)
                .await
                .is_err()
            {
                warn!(
                    timeout_ms = timing::WORKER_STOP_TIMEOUT.as_millis() as u64,
                    "Worker did not stop in time"
                );
            }
        }
        Ok(())
    }

    /// Leave the failed state and resume processing
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.transition(Lifecycle::Reset)
    }

    fn transition(&self, action: Lifecycle) -> Result<(), PipelineError> {
        let shared = &self.shared;
        let mut control = shared.control();
        let current = shared.state.borrow().clone();

        let Some(next) = current.apply(action)? else {
            debug!(state = current.name(), ?action, "Lifecycle request is a no-op");
            return Ok(());
        };

        match next {
            PipelineState::Active => {
                let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
                shared.slot.clear();
                let worker = shared.spawn_worker(&runtime);
                info!(session = %worker.session, "Pipeline session started");
                control.active = Some(worker);
            }
            PipelineState::Paused => {
                if let Some(worker) = control.active.take() {
                    // Worker may already be gone
                    let _ = worker.stop_tx.send(());
                    control.retired = Some(worker.monitor);
                }
                shared.slot.clear();
            }
            _ => {}
        }

        info!(from = current.name(), to = next.name(), "Pipeline state changed");
        shared.state.send_replace(next);
        Ok(())
    }

    /// Offer a camera frame; returns whether it was accepted
    ///
    /// Frames are only accepted while active. A frame still waiting behind
    /// the one in flight is replaced.
    pub fn submit_frame(&self, frame: RawFrame) -> bool {
        self.shared.submit(frame)
    }

    /// A sink that feeds frames into this pipeline from any thread
    pub fn frame_sink(&self) -> Arc<dyn FrameSink> {
        Arc::new(PipelineSink {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Select the filter applied to subsequent frames (`None` = no filter)
    ///
    /// Starts loading the filter's assets in the background.
    pub fn select_filter(&self, filter: Option<FilterDefinition>) {
        if let Some(definition) = &filter {
            match Handle::try_current() {
                Ok(runtime) => {
                    let cache = Arc::clone(self.shared.compositor.cache());
                    let filter_id = definition.id.clone();
                    runtime.spawn(async move {
                        if let Err(e) = cache.load(&filter_id).await {
                            warn!(filter = %filter_id, error = %e, "Failed to warm filter assets");
                        }
                    });
                }
                Err(_) => debug!(filter = %definition.id, "No runtime, assets load on first frame"),
            }
        }

        info!(
            filter = filter.as_ref().map(|f| f.id.as_str()).unwrap_or("none"),
            "Filter selected"
        );
        self.shared.filter.send_replace(filter);
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<DecodedFrame>> {
        self.shared.frames.subscribe()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<Option<AnalysisResult>> {
        self.shared.results.subscribe()
    }

    pub fn subscribe_filter(&self) -> watch::Receiver<Option<FilterDefinition>> {
        self.shared.filter.subscribe()
    }

    /// Most recently published frame
    pub fn latest_frame(&self) -> Option<DecodedFrame> {
        self.shared.frames.borrow().clone()
    }

    /// Most recent successful analysis
    pub fn latest_result(&self) -> Option<AnalysisResult> {
        self.shared.results.borrow().clone()
    }

    pub fn selected_filter(&self) -> Option<FilterDefinition> {
        self.shared.filter.borrow().clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.compositor.cache().stats()
    }

    /// Drop all cached filter assets (host memory pressure)
    pub fn clear_asset_cache(&self) {
        self.shared.compositor.cache().clear();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.shared.control().active.take() {
            debug!(session = %worker.session, "Pipeline dropped, stopping worker");
            let _ = worker.stop_tx.send(());
        }
    }
}

struct PipelineSink {
    shared: Arc<Shared>,
}

impl FrameSink for PipelineSink {
    fn push_frame(&self, frame: RawFrame) -> bool {
        self.shared.submit(frame)
    }
}

async fn run_worker(shared: Arc<Shared>, session: Uuid, mut stop_rx: oneshot::Receiver<()>) {
    let span = info_span!("preview_worker", session = %session);

    async move {
        debug!("Worker started");
        let config = &shared.config;
        let budget = config.frame_budget();
        let mut health = SourceHealth::new(
            config.max_unsupported_format_failures,
            config.max_layout_failures,
        );
        let mut processor = FrameProcessor::new(
            Arc::clone(&shared.converter),
            shared.analysis.clone(),
            shared.compositor.clone(),
            config.mirror_preview,
        );

        loop {
            let raw = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                raw = shared.slot.next() => raw,
            };

            let sequence = raw.sequence;
            StatsCounters::bump(&shared.stats.processed);
            let filter = shared.filter.borrow().clone();

            let outcome = tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    debug!(sequence, "Abandoning in-flight frame");
                    break;
                }
                outcome = processor.run_cycle(raw, filter.as_ref()) => outcome,
            };

            match outcome {
                CycleOutcome::Published {
                    frame,
                    analysis,
                    analysis_error,
                    composition_error,
                    timings,
                } => {
                    health.record_success();

                    if let Some(e) = analysis_error {
                        StatsCounters::bump(&shared.stats.analysis_failures);
                        debug!(sequence, error = %e, "Analysis failed, keeping previous result");
                    }
                    if composition_error.is_some() {
                        StatsCounters::bump(&shared.stats.composition_failures);
                    }
                    if timings.total > budget {
                        StatsCounters::bump(&shared.stats.over_budget);
                        timings.log_over_budget(sequence, budget);
                    }

                    // Stopped while finishing this cycle
                    if !shared.is_current(session) {
                        break;
                    }

                    if let Some(result) = analysis {
                        shared.results.send_replace(Some(result));
                    }
                    shared.frames.send_replace(Some(frame));
                    StatsCounters::bump(&shared.stats.published);

                    if sequence % timing::FRAME_LOG_INTERVAL == 0 {
                        let stats = shared.stats.snapshot();
                        debug!(
                            sequence,
                            published = stats.frames_published,
                            replaced = stats.frames_replaced,
                            "Preview pipeline progress"
                        );
                    }
                }
                CycleOutcome::Dropped(e) => {
                    StatsCounters::bump(&shared.stats.conversion_failures);
                    warn!(sequence, error = %e, "Dropping unconvertible frame");
                    if let Some(reason) = health.record_failure(&e) {
                        shared.fail(session, reason);
                        break;
                    }
                }
                CycleOutcome::Cancelled => {
                    debug!(sequence, "Runtime shutting down");
                    break;
                }
            }
        }

        if shared.superseded(session) {
            debug!("Newer session running, keeping scratch buffers");
        } else {
            processor.release_scratch();
        }
        debug!("Worker stopped");
    }
    .instrument(span)
    .await
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::analysis::FixedAnalysisService;
    use crate::backends::assets::InMemoryAssetStore;

    fn pipeline() -> Pipeline {
        let cache = Arc::new(FilterAssetCache::new(
            Arc::new(InMemoryAssetStore::new()),
            1 << 20,
        ));
        Pipeline::new(
            Config::default(),
            Arc::new(FixedAnalysisService::empty()),
            cache,
        )
    }

    #[test]
    fn test_start_needs_runtime() {
        let pipeline = pipeline();
        assert_eq!(pipeline.start(), Err(PipelineError::NoRuntime));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_frames_ignored_before_start() {
        let pipeline = pipeline();
        let frame = RawFrame::new(2, 2, crate::media::PixelFormat::Nv21, Vec::new());
        assert!(!pipeline.submit_frame(frame));
        assert_eq!(pipeline.stats().frames_accepted, 0);
    }

    fn pooled_bytes(pipeline: &Pipeline) -> usize {
        pipeline
            .shared
            .converter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pool_stats()
            .pooled_bytes
    }

    fn nv21_frame(sequence: u64) -> RawFrame {
        let rgba = vec![200u8; 8 * 6 * 4];
        crate::media::encode_rgba(8, 6, &rgba, crate::media::SyntheticLayout::Nv21, 0)
            .with_sequence(sequence)
    }

    async fn publish(pipeline: &Pipeline, sequence: u64) {
        let mut frames = pipeline.subscribe_frames();
        assert!(pipeline.submit_frame(nv21_frame(sequence)));
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            frames.wait_for(|f| f.as_ref().is_some_and(|f| f.sequence() == sequence)),
        )
        .await
        .unwrap()
        .unwrap();
    }

    // Single-threaded runtime: the old worker cannot run between stop and start
    #[tokio::test]
    async fn test_restart_keeps_converter_buffers() {
        let pipeline = pipeline();
        pipeline.start().unwrap();
        publish(&pipeline, 0).await;
        assert!(pooled_bytes(&pipeline) > 0);

        pipeline.stop().unwrap();
        pipeline.start().unwrap();
        let retired = pipeline.shared.control().retired.take().unwrap();
        retired.await.unwrap();
        assert!(pooled_bytes(&pipeline) > 0);

        // Without a successor the buffers go
        publish(&pipeline, 1).await;
        pipeline.stop_and_wait().await.unwrap();
        assert_eq!(pooled_bytes(&pipeline), 0);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(3u8)), "unknown panic");
    }
}
