use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::camera::domain::frame_source::{CameraError, FrameSource};
use crate::shared::frame::Frame;

/// Frame source fake: yields a fixed sequence of frames and read errors,
/// then reports end of stream.
pub struct MemoryFrameSource {
    items: VecDeque<Result<Frame, String>>,
    opened: bool,
    fail_open: bool,
    closed: Arc<AtomicBool>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self::with_results(frames.into_iter().map(Ok).collect())
    }

    pub fn with_results(items: Vec<Result<Frame, String>>) -> Self {
        Self {
            items: items.into(),
            opened: false,
            fail_open: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A source whose `open` always fails, like a missing device.
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::with_results(Vec::new())
        }
    }

    /// Flag set once `close` has run.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl FrameSource for MemoryFrameSource {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.fail_open {
            return Err(CameraError::Open {
                device: "memory".into(),
                reason: "unavailable".into(),
            }
            .into());
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if !self.opened {
            return Err(CameraError::NotOpened.into());
        }
        match self.items.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(message)) => Err(message.into()),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.opened = false;
        self.closed.store(true, Ordering::SeqCst);
    }
}
