// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames accepted into the pending slot
    pub frames_accepted: u64,
    /// Pending frames displaced by a newer one before processing
    pub frames_replaced: u64,
    /// Frames taken by the worker and run through a cycle
    pub frames_processed: u64,
    /// Frames published to observers
    pub frames_published: u64,
    pub conversion_failures: u64,
    pub analysis_failures: u64,
    pub composition_failures: u64,
    /// Cycles that took longer than the frame budget
    pub over_budget_frames: u64,
    /// Current or most recent session
    pub session_id: Option<Uuid>,
}

/// Live counters shared by the pipeline handle and its worker
#[derive(Default)]
pub(crate) struct StatsCounters {
    pub(crate) accepted: AtomicU64,
    pub(crate) replaced: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) published: AtomicU64,
    pub(crate) conversion_failures: AtomicU64,
    pub(crate) analysis_failures: AtomicU64,
    pub(crate) composition_failures: AtomicU64,
    pub(crate) over_budget: AtomicU64,
    session_id: Mutex<Option<Uuid>>,
}

impl StatsCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_session(&self, session: Uuid) {
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            frames_accepted: load(&self.accepted),
            frames_replaced: load(&self.replaced),
            frames_processed: load(&self.processed),
            frames_published: load(&self.published),
            conversion_failures: load(&self.conversion_failures),
            analysis_failures: load(&self.analysis_failures),
            composition_failures: load(&self.composition_failures),
            over_budget_frames: load(&self.over_budget),
            session_id: *self.session_id.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}
