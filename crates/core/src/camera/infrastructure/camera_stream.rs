use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::domain::frame_source::FrameSource;
use crate::camera::domain::latest_frame::LatestFrame;
use crate::shared::constants::CAMERA_RETRY_BACKOFF_MS;

/// Owns the acquisition thread: reads the source as fast as it delivers
/// and publishes every frame into a [`LatestFrame`] slot.
///
/// Read errors are logged and retried after a short backoff. End of
/// stream raises the shared cancellation flag. The source is closed when
/// the thread exits, and the thread is joined on `stop` or drop.
pub struct CameraStream {
    latest: Arc<LatestFrame>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CameraStream {
    /// Opens `source` on the calling thread, so a missing device fails
    /// here, then starts acquisition.
    pub fn start(
        mut source: Box<dyn FrameSource>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        source.open()?;
        Ok(Self::spawn(source, cancelled, Duration::from_millis(CAMERA_RETRY_BACKOFF_MS)))
    }

    fn spawn(
        mut source: Box<dyn FrameSource>,
        cancelled: Arc<AtomicBool>,
        backoff: Duration,
    ) -> Self {
        let latest = Arc::new(LatestFrame::new());
        let handle = {
            let latest = latest.clone();
            let cancelled = cancelled.clone();
            std::thread::spawn(move || {
                while !cancelled.load(Ordering::Relaxed) {
                    match source.read() {
                        Ok(Some(frame)) => {
                            latest.publish(frame);
                        }
                        Ok(None) => {
                            log::info!("Camera stream ended");
                            cancelled.store(true, Ordering::Relaxed);
                        }
                        Err(e) => {
                            log::warn!("Camera read failed: {e}, retrying");
                            std::thread::sleep(backoff);
                        }
                    }
                }
                source.close();
            })
        };

        Self {
            latest,
            cancelled,
            handle: Some(handle),
        }
    }

    pub fn latest(&self) -> Arc<LatestFrame> {
        self.latest.clone()
    }

    /// Signals cancellation and waits for the source to be released.
    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Camera thread panicked");
            }
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::infrastructure::memory_frame_source::MemoryFrameSource;
    use crate::shared::frame::Frame;
    use std::time::Instant;

    fn wait_for(flag: &AtomicBool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        flag.load(Ordering::SeqCst)
    }

    #[test]
    fn test_end_of_stream_cancels_and_keeps_last_frame() {
        let source = MemoryFrameSource::new((0..5).map(|i| Frame::blank(4, 4, i)).collect());
        let closed = source.closed_flag();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut stream = CameraStream::start(Box::new(source), cancelled.clone()).unwrap();
        assert!(wait_for(&cancelled));
        stream.stop();

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(stream.latest().latest().unwrap().1.index(), 4);
    }

    #[test]
    fn test_read_errors_are_retried() {
        let mut source = MemoryFrameSource::with_results(vec![
            Err("usb hiccup".into()),
            Ok(Frame::blank(4, 4, 9)),
        ]);
        source.open().unwrap();
        let cancelled = Arc::new(AtomicBool::new(false));
        let stream = CameraStream::spawn(Box::new(source), cancelled.clone(), Duration::ZERO);
        assert!(wait_for(&cancelled));
        assert_eq!(stream.latest().latest().unwrap().1.index(), 9);
    }

    #[test]
    fn test_stop_returns_while_device_keeps_failing() {
        let failures = (0..10_000).map(|_| Err("No such device".to_string())).collect();
        let mut source = MemoryFrameSource::with_results(failures);
        source.open().unwrap();
        let closed = source.closed_flag();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut stream =
            CameraStream::spawn(Box::new(source), cancelled.clone(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!cancelled.load(Ordering::SeqCst));

        stream.stop();
        assert!(closed.load(Ordering::SeqCst));
        assert!(stream.latest().latest().is_none());
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let cancelled = Arc::new(AtomicBool::new(false));
        assert!(CameraStream::start(Box::new(MemoryFrameSource::unavailable()), cancelled).is_err());
    }

    #[test]
    fn test_drop_releases_source() {
        // A source that never ends: a long run of frames.
        let source = MemoryFrameSource::new((0..100_000).map(|i| Frame::blank(1, 1, i)).collect());
        let closed = source.closed_flag();
        let cancelled = Arc::new(AtomicBool::new(false));

        let stream = CameraStream::start(Box::new(source), cancelled).unwrap();
        drop(stream);
        assert!(closed.load(Ordering::SeqCst));
    }
}
