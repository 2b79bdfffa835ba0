use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::camera::domain::latest_frame::LatestFrame;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::fps_counter::FpsCounter;
use crate::pipeline::frame_renderer::{FrameRenderer, Telemetry};
use crate::shared::constants::{FPS_WINDOW_FRAMES, NO_FRAME_SLEEP_MS};
use crate::shared::frame::Frame;
use crate::tracking::domain::identity_resolver::IdentityResolver;

/// Out-of-band control of a running loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopCommand {
    /// Stop processing frames; acquisition continues.
    Freeze,
    Resume,
    /// Forget all tracks and smoothing state.
    Reset,
}

/// The processing context: newest frame → detect → resolve → render.
///
/// Owns the detector, resolver and renderer exclusively; only the frame
/// slot and the cancellation flag are shared with other threads.
pub struct RecognitionLoop {
    detector: Box<dyn FaceDetector>,
    resolver: IdentityResolver,
    renderer: Box<dyn FrameRenderer>,
    fps: FpsCounter,
    frame_interval: Duration,
    min_sleep: Duration,
    commands: Option<Receiver<LoopCommand>>,
    frozen: bool,
}

impl RecognitionLoop {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        resolver: IdentityResolver,
        renderer: Box<dyn FrameRenderer>,
        frame_interval: Duration,
        min_sleep: Duration,
    ) -> Self {
        Self {
            detector,
            resolver,
            renderer,
            fps: FpsCounter::new(FPS_WINDOW_FRAMES, Instant::now()),
            frame_interval,
            min_sleep,
            commands: None,
            frozen: false,
        }
    }

    pub fn with_commands(mut self, commands: Receiver<LoopCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Processes one frame. Returns `None` when detection failed and the
    /// frame was skipped.
    pub fn step(&mut self, frame: &Frame, now: Instant) -> Option<Telemetry> {
        let t = Instant::now();
        let detections = match self.detector.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                return None;
            }
        };
        let detect_ms = t.elapsed().as_secs_f64() * 1000.0;

        let t = Instant::now();
        let output = self.resolver.observe(frame, &detections, now);
        let resolve_ms = t.elapsed().as_secs_f64() * 1000.0;

        let telemetry = Telemetry {
            frame_index: frame.index(),
            fps: self.fps.tick(now),
            tracks: output.tracks,
            diagnostics: output.diagnostics,
            timings: vec![("detect", detect_ms), ("resolve", resolve_ms)],
        };
        self.renderer.render(frame, &telemetry);
        Some(telemetry)
    }

    /// Runs until `cancelled` is set and returns the number of frames processed.
    ///
    /// Each iteration takes whatever frame is newest, so a slow iteration
    /// drops frames rather than falling behind. The same frame may be
    /// processed twice if the camera is slower than the loop.
    pub fn run(&mut self, latest: &LatestFrame, cancelled: &AtomicBool) -> usize {
        let mut processed = 0;
        while !cancelled.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.apply_commands();

            if !self.frozen {
                let Some((_, frame)) = latest.latest() else {
                    std::thread::sleep(Duration::from_millis(NO_FRAME_SLEEP_MS));
                    continue;
                };
                if self.step(&frame, started).is_some() {
                    processed += 1;
                }
            }

            let elapsed = started.elapsed();
            std::thread::sleep(self.frame_interval.saturating_sub(elapsed).max(self.min_sleep));
        }
        self.renderer.summary();
        processed
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    fn apply_commands(&mut self) {
        let Some(commands) = &self.commands else {
            return;
        };
        for command in commands.try_iter() {
            match command {
                LoopCommand::Freeze => {
                    self.frozen = true;
                    log::info!("Processing frozen");
                }
                LoopCommand::Resume => {
                    self.frozen = false;
                    log::info!("Processing resumed");
                }
                LoopCommand::Reset => self.resolver.reset(),
            }
        }
    }
}
