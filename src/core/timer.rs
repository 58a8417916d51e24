use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// Paces a loop at a fixed rate.
///
/// Each tick starts a period of `1 / hz`; `remaining` is what is left of that
/// period, so the wait shrinks by however long the tick's own work took.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    interval: Duration,
    tick_started: Option<Instant>,
}

impl FramePacer {
    /// Create pacer for the given frequency; fails if its period is not a representable duration
    pub fn new(hz: f32) -> Result<Self, ConfigError> {
        let interval = Duration::try_from_secs_f32(1.0 / hz).map_err(|e| {
            ConfigError::Validation(format!("target_fps {hz} has no usable frame period: {e}"))
        })?;
        Ok(Self {
            interval,
            tick_started: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the start of a tick
    pub fn begin_tick(&mut self, now: Instant) {
        self.tick_started = Some(now);
    }

    /// Time left in the current period, zero if the tick overran
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.tick_started {
            Some(start) => self.interval.saturating_sub(now.duration_since(start)),
            None => Duration::ZERO,
        }
    }
}

/// Throttled timer - minimum interval between fires
#[derive(Debug, Clone, Copy)]
pub struct Throttled {
    min_interval: f32,
    time_since_last: f32,
}

impl Throttled {
    pub fn new(min_interval: f32) -> Self {
        Self {
            min_interval,
            time_since_last: 0.0,
        }
    }

    /// Accumulate delta; returns the elapsed window when it fires
    pub fn try_tick(&mut self, delta: f32) -> Option<f32> {
        self.time_since_last += delta;

        if self.time_since_last >= self.min_interval {
            let window = self.time_since_last;
            self.time_since_last = 0.0;
            Some(window)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_interval_matches_rate() {
        let pacer = FramePacer::new(30.0).unwrap();
        let expected = 1.0 / 30.0;
        assert!((pacer.interval().as_secs_f32() - expected).abs() < 1e-6);
    }

    #[test]
    fn pacer_subtracts_work_time() {
        let mut pacer = FramePacer::new(10.0).unwrap(); // 100ms
        let start = Instant::now();
        pacer.begin_tick(start);

        let remaining = pacer.remaining(start + Duration::from_millis(30));
        assert!(remaining <= Duration::from_millis(71));
        assert!(remaining >= Duration::from_millis(69));
    }

    #[test]
    fn pacer_overrun_waits_zero() {
        let mut pacer = FramePacer::new(10.0).unwrap();
        let start = Instant::now();
        pacer.begin_tick(start);
        assert_eq!(pacer.remaining(start + Duration::from_millis(250)), Duration::ZERO);
    }

    #[test]
    fn pacer_before_first_tick() {
        let pacer = FramePacer::new(60.0).unwrap();
        assert_eq!(pacer.remaining(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn pacer_rejects_rates_without_a_period() {
        for hz in [0.0, -1.0, 1e-30, f32::NAN] {
            assert!(
                matches!(FramePacer::new(hz), Err(ConfigError::Validation(_))),
                "{hz} should be rejected"
            );
        }
        assert!(FramePacer::new(1e-3).is_ok());
    }

    #[test]
    fn throttled_reports_window() {
        let mut timer = Throttled::new(1.0);

        assert_eq!(timer.try_tick(0.6), None);
        let window = timer.try_tick(0.6).unwrap();
        assert!((window - 1.2).abs() < 1e-6);
        assert_eq!(timer.try_tick(0.1), None);
    }
}
