// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for frame-producing loops
//!
//! A frame source runs on its own named OS thread so the producer never
//! shares a thread with the pipeline worker or a UI loop. The loop body is a
//! closure called once per iteration; pacing and stop handling live here.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What the frame callback wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    /// Source exhausted or sink gone
    Stop,
}

/// Owns the thread of a frame-producing loop
///
/// ```ignore
/// let mut producer = CaptureLoopController::start_paced(
///     "synthetic-camera",
///     Duration::from_millis(33),
///     move || {
///         sink.push_frame(next_frame());
///         LoopAction::Continue
///     },
/// )?;
/// // ...
/// producer.stop();
/// ```
pub struct CaptureLoopController {
    thread: Option<JoinHandle<()>>,
    stop_requested: Arc<AtomicBool>,
    /// Completed callback invocations
    iterations: Arc<AtomicU64>,
    name: String,
}

impl CaptureLoopController {
    /// Run `loop_fn` back to back until it returns `LoopAction::Stop` or
    /// the controller is stopped
    pub fn start<F>(name: &str, loop_fn: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn(name, None, loop_fn)
    }

    /// Run `loop_fn` at most once per `interval`
    ///
    /// An iteration that overruns the interval is followed immediately by
    /// the next one; missed ticks are not made up.
    pub fn start_paced<F>(name: &str, interval: Duration, loop_fn: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn(name, Some(interval), loop_fn)
    }

    fn spawn<F>(name: &str, interval: Option<Duration>, mut loop_fn: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let iterations = Arc::new(AtomicU64::new(0));
        let thread_stop = Arc::clone(&stop_requested);
        let thread_iterations = Arc::clone(&iterations);
        let thread_name = name.to_string();

        info!(name = %name, interval_ms = interval.map(|i| i.as_millis() as u64), "Starting frame loop");

        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %thread_name, "Frame loop thread started");
            let mut next_tick = Instant::now();

            loop {
                if thread_stop.load(Ordering::SeqCst) {
                    debug!(name = %thread_name, "Stop signal received");
                    break;
                }

                let action = loop_fn();
                thread_iterations.fetch_add(1, Ordering::Relaxed);
                if action == LoopAction::Stop {
                    debug!(name = %thread_name, "Loop requested stop");
                    break;
                }

                if let Some(interval) = interval {
                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick > now {
                        sleep_unless_stopped(next_tick - now, &thread_stop);
                    } else {
                        next_tick = now;
                    }
                }
            }

            info!(name = %thread_name, "Frame loop thread exiting");
        })?;

        Ok(Self {
            thread: Some(thread),
            stop_requested,
            iterations,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of completed loop iterations
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Signal the loop to stop without waiting for it
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Request a stop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the loop to end on its own
    pub fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match thread.join() {
            Ok(()) => debug!(name = %self.name, iterations = self.iterations(), "Frame loop joined"),
            Err(_) => warn!(name = %self.name, "Frame loop callback panicked"),
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread.is_some() {
            debug!(name = %self.name, "Frame loop dropped while running");
            self.stop();
        }
    }
}

/// Sleep in short slices so a stop request is honored quickly
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(10);
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(SLICE));
    }
}
