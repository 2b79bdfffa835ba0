use std::collections::HashMap;
use std::time::Instant;

use crate::recognition::domain::recognizer::AttemptReport;
use crate::shared::frame::Frame;
use crate::tracking::domain::identity_resolver::TrackView;

/// Everything the processing loop knows about one processed frame.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    pub frame_index: usize,
    /// `None` until the first FPS window completes.
    pub fps: Option<f64>,
    pub tracks: Vec<TrackView>,
    /// Recognition results applied while processing this frame.
    pub diagnostics: Vec<AttemptReport>,
    /// `(stage, milliseconds)` for this frame.
    pub timings: Vec<(&'static str, f64)>,
}

/// Display sink for processed frames.
///
/// Decouples the loop from how results are presented (log lines, a
/// window, a network feed).
pub trait FrameRenderer: Send {
    fn render(&mut self, frame: &Frame, telemetry: &Telemetry);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every frame. Used in tests where output is irrelevant.
pub struct NullRenderer;

impl FrameRenderer for NullRenderer {
    fn render(&mut self, _frame: &Frame, _telemetry: &Telemetry) {}
}

/// Constant-size running sum, so a session of any length keeps the same footprint.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningTotal {
    pub sum: f64,
    pub count: usize,
}

impl RunningTotal {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count.max(1) as f64
    }
}

/// Headless renderer: reports visible tracks through `log`, throttled to
/// every `throttle_frames` frames, and keeps stage timings for a summary.
pub struct LogRenderer {
    throttle_frames: usize,
    timings: HashMap<&'static str, RunningTotal>,
    track_counts: RunningTotal,
    start_time: Instant,
    frames: usize,
    last_fps: Option<f64>,
}

impl LogRenderer {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            track_counts: RunningTotal::default(),
            start_time: Instant::now(),
            frames: 0,
            last_fps: None,
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was rendered.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Session summary ({} frames, {:.1}s total):",
            self.frames,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = self.timings[stage];
            let (avg_ms, total_ms) = (durations.mean(), durations.sum);
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let avg_tracks = self.track_counts.mean();
        lines.push(format!("  tracks: avg {avg_tracks:.1}"));
        if let Some(fps) = self.last_fps {
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<RunningTotal> {
        self.timings.get(stage).copied()
    }
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FrameRenderer for LogRenderer {
    fn render(&mut self, _frame: &Frame, telemetry: &Telemetry) {
        self.frames += 1;
        for (stage, ms) in &telemetry.timings {
            self.timings.entry(*stage).or_default().add(*ms);
        }
        self.track_counts.add(telemetry.tracks.len() as f64);
        if telemetry.fps.is_some() {
            self.last_fps = telemetry.fps;
        }

        if self.frames % self.throttle_frames == 0 {
            let labels: Vec<String> = telemetry
                .tracks
                .iter()
                .map(|t| format!("{}: {}", t.track_id, t.label))
                .collect();
            log::info!(
                "Frame {} ({}): [{}]",
                telemetry.frame_index,
                telemetry
                    .fps
                    .map_or("-- fps".to_string(), |f| format!("{f:.1} fps")),
                labels.join(", ")
            );
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
