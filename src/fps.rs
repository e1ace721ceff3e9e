//! Windowed frame-rate estimate.

use std::time::Instant;

/// Frames per measurement window.
pub const FPS_WINDOW: u32 = 10;

/// Counts frames and publishes an average rate once per window.
///
/// Between windows `current_fps()` keeps returning the last published value,
/// so a display that refreshes every frame does not flicker. Before the
/// first window completes the rate is `0.0`.
#[derive(Debug, Clone)]
pub struct FpsEstimator {
    window: u32,
    count: u32,
    window_start: Instant,
    current: f32,
}

impl FpsEstimator {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Estimator whose first window opens at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self::with_window(FPS_WINDOW, start)
    }

    pub fn with_window(window: u32, start: Instant) -> Self {
        Self {
            window: window.max(1),
            count: 0,
            window_start: start,
            current: 0.0,
        }
    }

    /// Record one processed frame now.
    pub fn tick(&mut self) -> Option<f32> {
        self.tick_at(Instant::now())
    }

    /// Record one processed frame at `now`. Returns the new rate when this
    /// tick closes a window.
    pub fn tick_at(&mut self, now: Instant) -> Option<f32> {
        self.count += 1;
        if self.count < self.window {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f32();
        // A zero-length window has no meaningful rate; keep the previous one.
        if elapsed > 0.0 {
            self.current = self.count as f32 / elapsed;
        }
        self.count = 0;
        self.window_start = now;
        Some(self.current)
    }

    pub fn current_fps(&self) -> f32 {
        self.current
    }

    /// Frames counted in the open window.
    pub fn pending(&self) -> u32 {
        self.count
    }
}

impl Default for FpsEstimator {
    fn default() -> Self {
        Self::new()
    }
}
