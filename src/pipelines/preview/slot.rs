// SPDX-License-Identifier: GPL-3.0-only

//! Keep-only-latest frame hand-off between the source and the worker
//!
//! Holds at most one pending frame. A frame arriving while another is
//! pending replaces it, so a slow worker never builds a backlog and always
//! picks up the newest frame next.

use crate::media::types::RawFrame;
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
pub(crate) struct FrameSlot {
    pending: Mutex<Option<RawFrame>>,
    notify: Notify,
}

impl FrameSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, returning the frame it displaced (if any)
    pub(crate) fn put(&self, frame: RawFrame) -> Option<RawFrame> {
        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(frame);
        self.notify.notify_one();
        replaced
    }

    pub(crate) fn take(&self) -> Option<RawFrame> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Drop any pending frame
    pub(crate) fn clear(&self) -> bool {
        self.take().is_some()
    }

    /// Wait for the next frame
    pub(crate) async fn next(&self) -> RawFrame {
        loop {
            if let Some(frame) = self.take() {
                return frame;
            }
            // notify_one stores a permit when nobody waits, so a put between
            // take() and here is not lost
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::PixelFormat;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(sequence: u64) -> RawFrame {
        RawFrame::new(2, 2, PixelFormat::Nv21, Vec::new()).with_sequence(sequence)
    }

    #[test]
    fn test_put_replaces_pending() {
        let slot = FrameSlot::new();
        assert!(slot.put(frame(1)).is_none());
        let replaced = slot.put(frame(2)).unwrap();
        assert_eq!(replaced.sequence, 1);
        assert_eq!(slot.take().unwrap().sequence, 2);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new();
        assert!(!slot.clear());
        slot.put(frame(1));
        assert!(slot.clear());
        assert!(slot.take().is_none());
    }

    #[tokio::test]
    async fn test_next_returns_latest() {
        let slot = FrameSlot::new();
        slot.put(frame(1));
        slot.put(frame(2));
        slot.put(frame(3));
        assert_eq!(slot.next().await.sequence, 3);
    }

    #[tokio::test]
    async fn test_next_waits_for_put() {
        let slot = Arc::new(FrameSlot::new());
        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.next().await.sequence })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.put(frame(7));

        let sequence = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sequence, 7);
    }
}
