//! Capture pacing.
//!
//! The scheduler keeps the average cycle period close to the target
//! interval under varying workload: the time already spent capturing,
//! diffing and encoding is subtracted from the target, so slow cycles
//! sleep less instead of drifting the effective frame rate downward.

use std::time::{Duration, Instant};

/// Computes the delay until the next capture cycle should begin.
///
/// State is one cycle deep: a start timestamp recorded by
/// [`begin_cycle`](Self::begin_cycle) and nothing else.
#[derive(Debug, Default)]
pub struct CaptureScheduler {
    cycle_start: Option<Instant>,
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of the current capture cycle.
    pub fn begin_cycle(&mut self) {
        self.cycle_start = Some(Instant::now());
    }

    /// Delay until the next cycle should begin, given the target
    /// inter-frame interval.
    ///
    /// Returns zero when the cycle already consumed the full interval;
    /// the loop never "catches up" by shortening future intervals.
    pub fn next_delay(&self, target_interval: Duration) -> Duration {
        let elapsed = self
            .cycle_start
            .map(|start| start.elapsed())
            .unwrap_or_default();
        Self::delay_for(target_interval, elapsed)
    }

    /// Pure pacing rule: `max(0, target − elapsed)`.
    fn delay_for(target: Duration, elapsed: Duration) -> Duration {
        target.saturating_sub(elapsed)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Duration = Duration::from_millis(40);

    #[test]
    fn fast_cycle_sleeps_the_remainder() {
        let elapsed = Duration::from_millis(15);
        assert_eq!(
            CaptureScheduler::delay_for(TARGET, elapsed),
            Duration::from_millis(25)
        );
    }

    #[test]
    fn slow_cycle_returns_zero_delay() {
        assert_eq!(
            CaptureScheduler::delay_for(TARGET, Duration::from_millis(40)),
            Duration::ZERO
        );
        assert_eq!(
            CaptureScheduler::delay_for(TARGET, Duration::from_millis(500)),
            Duration::ZERO
        );
    }

    #[test]
    fn delay_before_first_cycle_is_full_interval() {
        let scheduler = CaptureScheduler::new();
        assert_eq!(scheduler.next_delay(TARGET), TARGET);
    }

    #[test]
    fn next_delay_shrinks_as_the_cycle_runs() {
        let mut scheduler = CaptureScheduler::new();
        scheduler.begin_cycle();
        std::thread::sleep(Duration::from_millis(5));
        let delay = scheduler.next_delay(TARGET);
        assert!(delay < TARGET);
    }
}
