use std::time::Instant;

/// Frames-per-second over fixed windows of processed frames.
///
/// The rate is recomputed once per window; between recomputations the
/// previous value is reported.
pub struct FpsCounter {
    window: usize,
    frames: usize,
    window_start: Instant,
    fps: Option<f64>,
}

impl FpsCounter {
    pub fn new(window: usize, now: Instant) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            window_start: now,
            fps: None,
        }
    }

    /// Counts one frame; returns the current estimate, `None` until the
    /// first window completes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if self.frames >= self.window {
            let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = Some(self.frames as f64 / elapsed);
            }
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn test_none_until_first_window() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new(30, t0);
        for i in 1..30 {
            assert!(counter.tick(t0 + Duration::from_millis(i * 33)).is_none());
        }
    }

    #[test]
    fn test_rate_over_window() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new(30, t0);
        let mut fps = None;
        for i in 1..=30 {
            fps = counter.tick(t0 + Duration::from_millis(i * 50));
        }
        // 30 frames over 1.5 s
        assert_relative_eq!(fps.unwrap(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_value_held_between_windows() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new(2, t0);
        counter.tick(t0 + Duration::from_millis(100));
        let first = counter.tick(t0 + Duration::from_millis(200)).unwrap();
        let held = counter.tick(t0 + Duration::from_millis(900)).unwrap();
        assert_relative_eq!(first, held);
        assert_relative_eq!(counter.fps().unwrap(), 10.0, epsilon = 1e-9);
    }
}
