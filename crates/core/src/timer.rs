//! Frame timing.

use std::time::{Duration, Instant};

/// Smoothing factor for the running frame-time average.
const SMOOTHING: f32 = 0.05;

/// Frame timer: per-frame delta plus a smoothed frame-time average.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    smoothed_delta: f32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            smoothed_delta: 0.0,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time elapsed since the last call to `tick()`, updating the running
    /// average. Call once per frame-loop iteration.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;

        let secs = delta.as_secs_f32();
        self.smoothed_delta = if self.smoothed_delta == 0.0 {
            secs
        } else {
            self.smoothed_delta + (secs - self.smoothed_delta) * SMOOTHING
        };

        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Smoothed frames per second, zero until the first tick.
    pub fn smoothed_fps(&self) -> f32 {
        if self.smoothed_delta > 0.0 {
            1.0 / self.smoothed_delta
        } else {
            0.0
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_advances() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(1));
        let delta = timer.tick();
        assert!(delta > Duration::ZERO);
        assert!(timer.elapsed() >= delta);
    }

    #[test]
    fn test_fps_zero_before_first_tick() {
        let timer = Timer::new();
        assert_eq!(timer.smoothed_fps(), 0.0);
    }

    #[test]
    fn test_fps_positive_after_tick() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(1));
        timer.tick();
        assert!(timer.smoothed_fps() > 0.0);
    }
}
