use std::sync::{Arc, Mutex, MutexGuard};

use crate::shared::frame::Frame;

/// Single-slot hand-off between the acquisition thread and the processing
/// loop. Publishing overwrites; readers always see the newest frame and
/// never wait for the next one.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<(u64, Arc<Frame>)>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame` as the newest and returns its sequence number.
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut slot = self.lock();
        let seq = slot.as_ref().map_or(1, |(prev, _)| prev + 1);
        *slot = Some((seq, Arc::new(frame)));
        seq
    }

    /// Newest frame with its sequence number, or `None` before the first publish.
    pub fn latest(&self) -> Option<(u64, Arc<Frame>)> {
        self.lock().clone()
    }

    // A panicking publisher cannot leave the slot half-written.
    fn lock(&self) -> MutexGuard<'_, Option<(u64, Arc<Frame>)>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
