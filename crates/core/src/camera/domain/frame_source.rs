use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("cannot open camera {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("no video stream in {device}")]
    NoVideoStream { device: String },
    #[error("camera is not open")]
    NotOpened,
    #[error("camera {device} delivered no data for {waited_ms} ms")]
    Stalled { device: String, waited_ms: u64 },
}

/// A live source of RGB frames: a capture device, a video file, or a fake.
///
/// Opened once, read repeatedly from the acquisition thread, closed on
/// shutdown.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Next frame, blocking until one is available. `Ok(None)` means the
    /// source is exhausted (end of a file); devices never return it.
    /// Must return within a bounded time so the caller can observe
    /// cancellation; device failures surface as `Err`.
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the device. Safe to call more than once.
    fn close(&mut self);
}
