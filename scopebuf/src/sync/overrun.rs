//! Drop accounting and rate-limited overrun reporting.
//!
//! A non-blocking put into a full buffer discards the item and bumps a
//! counter. Reporting every drop would flood diagnostics whenever a consumer
//! falls behind, so only the aggregate count is surfaced, and only when it
//! has grown past the last reported value and past a minimum threshold:
//!
//! ```text
//! dropped:      0 ... 20  21  21  22  22  22  40
//! take_report:  -     -   21  -   22  -   -   40
//! ```
//!
//! The tracker holds no lock of its own; it lives inside the buffer's state
//! and is mutated under the buffer's mutex.

/// Cumulative drop counter with a reporting watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrunTracker {
    enabled: bool,
    min_dropped_before_report: u64,
    dropped: u64,
    last_reported: u64,
}

impl OverrunTracker {
    #[must_use]
    pub const fn new(enabled: bool, min_dropped_before_report: u64) -> Self {
        Self {
            enabled,
            min_dropped_before_report,
            dropped: 0,
            last_reported: 0,
        }
    }

    /// Records one discarded item.
    #[inline]
    pub const fn record_drop(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    /// Total number of items discarded so far.
    #[inline]
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drop count carried by the most recent report (0 if none yet).
    #[inline]
    #[must_use]
    pub const fn last_reported(&self) -> u64 {
        self.last_reported
    }

    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the count to report if a report is due, advancing the watermark.
    ///
    /// A report is due when reporting is enabled, the count grew since the
    /// last report, and the count exceeds the minimum threshold. At most one
    /// report is produced per distinct growth of the counter.
    pub const fn take_report(&mut self) -> Option<u64> {
        if self.enabled
            && self.dropped > self.last_reported
            && self.dropped > self.min_dropped_before_report
        {
            self.last_reported = self.dropped;
            return Some(self.dropped);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_n(tracker: &mut OverrunTracker, n: u64) {
        for _ in 0..n {
            tracker.record_drop();
        }
    }

    #[test]
    fn test_no_report_at_or_below_threshold() {
        let mut tracker = OverrunTracker::new(true, 20);
        drop_n(&mut tracker, 20);

        assert_eq!(tracker.dropped(), 20);
        assert_eq!(tracker.take_report(), None);
        assert_eq!(tracker.last_reported(), 0);
    }

    #[test]
    fn test_reports_once_per_growth() {
        let mut tracker = OverrunTracker::new(true, 20);
        drop_n(&mut tracker, 21);

        assert_eq!(tracker.take_report(), Some(21));
        assert_eq!(tracker.take_report(), None);
        assert_eq!(tracker.take_report(), None);

        tracker.record_drop();
        assert_eq!(tracker.take_report(), Some(22));
        assert_eq!(tracker.take_report(), None);

        drop_n(&mut tracker, 18);
        assert_eq!(tracker.take_report(), Some(40));
        assert_eq!(tracker.last_reported(), 40);
    }

    #[test]
    fn test_disabled_never_reports() {
        let mut tracker = OverrunTracker::new(false, 20);
        drop_n(&mut tracker, 100);

        assert!(!tracker.is_enabled());
        assert_eq!(tracker.dropped(), 100);
        assert_eq!(tracker.take_report(), None);
        assert_eq!(tracker.last_reported(), 0);
    }

    #[test]
    fn test_zero_threshold_reports_first_drop() {
        let mut tracker = OverrunTracker::new(true, 0);
        assert_eq!(tracker.take_report(), None);

        tracker.record_drop();
        assert_eq!(tracker.take_report(), Some(1));
    }
}
