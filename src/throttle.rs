//! Error-print throttle for the poll path.
//!
//! A poller cycling every 100 ms against a dead link would log ten identical
//! errors per second. Each scope (an axis, or the controller's TSS poll) owns
//! one `ErrorThrottle`: a failure is reported when the interval has elapsed
//! since the last report, or when the previous poll of that scope succeeded.

use std::time::{Duration, Instant};

/// Default spacing between reports.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-scope report limiter.
#[derive(Debug, Clone)]
pub struct ErrorThrottle {
    interval: Duration,
    last_report: Option<Instant>,
    force_next: bool,
    reported: u64,
    suppressed: u64,
}

impl ErrorThrottle {
    /// Throttle with the given spacing. The first failure is always reported.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            force_next: true,
            reported: 0,
            suppressed: 0,
        }
    }

    /// Record a failure at `now`; true if it should be reported.
    pub fn should_report(&mut self, now: Instant) -> bool {
        let elapsed = self
            .last_report
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);

        if elapsed || self.force_next {
            self.last_report = Some(now);
            self.force_next = false;
            self.reported += 1;
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Record a success: the next failure is reported immediately.
    pub fn clear(&mut self) {
        self.force_next = true;
    }

    /// Failures reported so far.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Failures swallowed so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Configured spacing.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once_per_interval() {
        let mut throttle = ErrorThrottle::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(throttle.should_report(t0));
        assert!(!throttle.should_report(t0 + Duration::from_millis(100)));
        assert!(!throttle.should_report(t0 + Duration::from_millis(999)));
        assert!(throttle.should_report(t0 + Duration::from_millis(1000)));
        assert!(!throttle.should_report(t0 + Duration::from_millis(1500)));

        assert_eq!(throttle.reported(), 2);
        assert_eq!(throttle.suppressed(), 3);
    }

    #[test]
    fn test_success_forces_next_report() {
        let mut throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        assert!(throttle.should_report(t0));
        throttle.clear();
        assert!(throttle.should_report(t0 + Duration::from_millis(10)));
        assert!(!throttle.should_report(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn test_clock_going_backwards_does_not_panic() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(50));
        let later = Instant::now() + Duration::from_secs(1);
        assert!(throttle.should_report(later));
        assert!(!throttle.should_report(later - Duration::from_millis(500)));
    }
}
