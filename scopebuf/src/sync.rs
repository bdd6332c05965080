//! Synchronization primitives for in-process communication.
//!
//! This module provides the latest-value cached buffer that connects
//! background receivers to a polling consumer, plus the pieces it is built
//! from.

pub mod buffer;
pub mod overrun;

use std::time::{Duration, Instant};

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Absolute deadline for a wait starting now, `None` for [`Timeout::Infinite`].
    ///
    /// A duration too large to represent as an `Instant` is treated as
    /// infinite.
    #[must_use]
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Infinite, Self::Duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_has_no_deadline() {
        assert_eq!(Timeout::Infinite.deadline(), None);
        assert_eq!(Timeout::from(None), Timeout::Infinite);
    }

    #[test]
    fn test_duration_deadline_is_in_the_future() {
        let before = Instant::now();
        let deadline = Timeout::from(Duration::from_millis(50)).deadline().unwrap();
        assert!(deadline >= before + Duration::from_millis(50));
    }

    #[test]
    fn test_unrepresentable_duration_is_infinite() {
        assert_eq!(Timeout::Duration(Duration::MAX).deadline(), None);
    }
}
