//! Frame timing

use std::time::{Duration, Instant};

/// Seconds of frame history averaged for [`Time::fps`]
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Clamp for a single frame's delta, so a stall doesn't teleport animations
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Per-frame timing
#[derive(Debug, Clone)]
pub struct Time {
    start: Instant,
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    window_frames: u32,
    window_elapsed: Duration,
    fps: f32,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            window_frames: 0,
            window_elapsed: Duration::ZERO,
            fps: 0.0,
        }
    }

    /// Advance to a new frame
    pub fn update(&mut self) {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.advance(delta);
    }

    /// Advance by an explicit delta
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta.min(MAX_DELTA);
        self.frame_count += 1;

        self.window_frames += 1;
        self.window_elapsed += delta;
        if self.window_elapsed >= FPS_WINDOW {
            self.fps = self.window_frames as f32 / self.window_elapsed.as_secs_f32();
            self.window_frames = 0;
            self.window_elapsed = Duration::ZERO;
        }
    }

    /// Time since the previous frame, clamped
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// [`Self::delta`] in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Wall-clock time since creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Frames counted so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second over the last full window, 0 until one has passed
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped() {
        let mut time = Time::new();
        time.advance(Duration::from_secs(3));
        assert_eq!(time.delta(), MAX_DELTA);
        assert_eq!(time.frame_count(), 1);
    }

    #[test]
    fn test_fps_over_window() {
        let mut time = Time::new();
        assert_eq!(time.fps(), 0.0);
        for _ in 0..50 {
            time.advance(Duration::from_millis(20));
        }
        assert!((time.fps() - 50.0).abs() < 0.5);
        assert!((time.delta_secs() - 0.02).abs() < 1e-6);
    }
}
