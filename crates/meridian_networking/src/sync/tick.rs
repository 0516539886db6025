//! # Update Timer
//!
//! Accumulates caller-supplied frame time and fires once per update period.
//!
//! The timer never reads the clock itself; the host loop passes the elapsed
//! seconds to [`UpdateTimer::advance`].

use std::time::Duration;

/// Fixed-period update timer.
#[derive(Clone, Debug)]
pub struct UpdateTimer {
    /// Target period between flushes.
    period: Duration,
    /// Time accumulated since the last flush.
    accumulator: Duration,
    /// Flushes fired so far.
    update_count: u64,
}

impl UpdateTimer {
    /// Creates a timer with a period in seconds.
    ///
    /// Non-positive or non-finite periods fall back to the default.
    #[must_use]
    pub fn new(period_secs: f32) -> Self {
        Self {
            period: period_from_secs(period_secs),
            accumulator: Duration::ZERO,
            update_count: 0,
        }
    }

    /// Adds elapsed time. Returns true if an update is due.
    ///
    /// At most one update fires per call; a backlog longer than one period
    /// is dropped rather than replayed.
    pub fn advance(&mut self, delta_secs: f32) -> bool {
        if let Ok(delta) = Duration::try_from_secs_f32(delta_secs) {
            self.accumulator = self.accumulator.saturating_add(delta);
        }
        if self.accumulator < self.period {
            return false;
        }
        self.accumulator -= self.period;
        if self.accumulator >= self.period {
            self.accumulator = Duration::ZERO;
        }
        self.update_count += 1;
        true
    }

    /// Changes the period, keeping accumulated time.
    pub fn set_period(&mut self, period_secs: f32) {
        self.period = period_from_secs(period_secs);
    }

    /// Period in seconds.
    #[inline]
    #[must_use]
    pub fn period_secs(&self) -> f32 {
        self.period.as_secs_f32()
    }

    /// Returns the number of updates fired.
    #[inline]
    #[must_use]
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }
}

impl Default for UpdateTimer {
    fn default() -> Self {
        Self::new(crate::DEFAULT_UPDATE_PERIOD)
    }
}

fn period_from_secs(secs: f32) -> Duration {
    match Duration::try_from_secs_f32(secs) {
        Ok(period) if !period.is_zero() => period,
        _ => Duration::from_secs_f32(crate::DEFAULT_UPDATE_PERIOD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_period() {
        let mut timer = UpdateTimer::new(0.1);
        assert!(!timer.advance(0.05));
        assert!(timer.advance(0.06));
        assert!(!timer.advance(0.02));
        assert_eq!(timer.update_count(), 1);
    }

    #[test]
    fn test_backlog_is_dropped() {
        let mut timer = UpdateTimer::new(0.1);
        assert!(timer.advance(1.0));
        assert!(!timer.advance(0.0));
    }

    #[test]
    fn test_invalid_input_is_ignored() {
        let mut timer = UpdateTimer::new(-1.0);
        assert!((timer.period_secs() - crate::DEFAULT_UPDATE_PERIOD).abs() < 1e-6);
        assert!(!timer.advance(f32::NAN));
        assert!(!timer.advance(-5.0));
    }
}
