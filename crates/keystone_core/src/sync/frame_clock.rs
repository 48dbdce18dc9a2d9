//! # Fixed Timestep
//!
//! Turns variable frame deltas into a whole number of simulation ticks plus
//! the leftover fraction used to interpolate between the last two ticks.

use std::time::Duration;

/// Longest frame delta fed into the accumulator. Longer stalls are dropped.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

/// Fixed-rate tick accumulator.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use keystone_core::sync::FixedTimestep;
///
/// let mut clock = FixedTimestep::new(Duration::from_millis(10));
/// assert_eq!(clock.advance(Duration::from_millis(25)), 2);
/// assert!((clock.alpha() - 0.5).abs() < 1e-4);
/// ```
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    ticks: u64,
}

impl FixedTimestep {
    /// Creates a clock ticking every `step`.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    #[must_use]
    pub fn new(step: Duration) -> Self {
        assert!(!step.is_zero(), "Tick step must be greater than zero");
        Self {
            step,
            accumulator: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Creates a clock ticking `hz` times per second.
    ///
    /// # Panics
    ///
    /// Panics if `hz` is zero.
    #[must_use]
    pub fn from_hz(hz: u32) -> Self {
        assert!(hz > 0, "Tick rate must be greater than zero");
        Self::new(Duration::from_secs(1) / hz)
    }

    /// Length of one tick.
    #[inline]
    #[must_use]
    pub const fn step(&self) -> Duration {
        self.step
    }

    /// Total ticks produced so far.
    #[inline]
    #[must_use]
    pub const fn total_ticks(&self) -> u64 {
        self.ticks
    }

    /// Feeds a frame delta and returns how many ticks to simulate.
    pub fn advance(&mut self, frame_delta: Duration) -> u32 {
        self.accumulator += frame_delta.min(MAX_FRAME_DELTA);

        let mut ticks = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
        }
        self.ticks += u64::from(ticks);
        ticks
    }

    /// Fraction of a tick left in the accumulator, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }

    /// Drops any accumulated time.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_ticks() {
        let mut clock = FixedTimestep::new(Duration::from_millis(10));
        assert_eq!(clock.advance(Duration::from_millis(30)), 3);
        assert_eq!(clock.alpha(), 0.0);
        assert_eq!(clock.total_ticks(), 3);
    }

    #[test]
    fn test_remainder_carries_over() {
        let mut clock = FixedTimestep::new(Duration::from_millis(10));
        assert_eq!(clock.advance(Duration::from_millis(6)), 0);
        assert_eq!(clock.advance(Duration::from_millis(6)), 1);
        assert!((clock.alpha() - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_long_stall_is_clamped() {
        let mut clock = FixedTimestep::new(Duration::from_millis(10));
        assert_eq!(clock.advance(Duration::from_secs(5)), 10);
    }

    #[test]
    fn test_from_hz() {
        let clock = FixedTimestep::from_hz(50);
        assert_eq!(clock.step(), Duration::from_millis(20));
    }
}
