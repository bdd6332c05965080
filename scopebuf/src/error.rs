//! Result variants for buffer operations.
//!
//! Overflow on a non-blocking put is not represented here: it is the
//! buffer's backpressure policy, counted and reported in aggregate rather
//! than surfaced per item.

use thiserror::Error;

/// Error returned by a blocking put that could not find a free slot in time.
///
/// The rejected item is handed back so the caller can retry, drop or
/// forward it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PutError<T> {
    /// The buffer stayed full until the deadline passed.
    #[error("timed out waiting for a free slot")]
    Timeout(T),
}

impl<T> PutError<T> {
    /// Returns the item that could not be inserted.
    pub fn into_inner(self) -> T {
        match self {
            Self::Timeout(item) => item,
        }
    }

    /// Returns `true` if the put gave up because its deadline passed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Error returned by a get that was not allowed to fall back to the cached
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GetError {
    /// Nothing was queued and the caller asked not to wait.
    #[error("buffer is empty")]
    Empty,
    /// Nothing arrived before the deadline.
    #[error("timed out waiting for an item")]
    Timeout,
}

impl GetError {
    /// Returns `true` for the non-blocking "no data available" case.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if a blocking wait ran out of time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Invalid [`ChannelConfig`](crate::ChannelConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A buffer must be able to hold at least one item.
    #[error("buffer capacity must be greater than 0")]
    ZeroCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_error_returns_item() {
        let err = PutError::Timeout(String::from("world"));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timed out waiting for a free slot");
        assert_eq!(err.into_inner(), "world");
    }

    #[test]
    fn test_get_error_variants_are_distinct() {
        assert!(GetError::Empty.is_empty());
        assert!(!GetError::Empty.is_timeout());
        assert!(GetError::Timeout.is_timeout());
        assert!(!GetError::Timeout.is_empty());
        assert_ne!(GetError::Empty.to_string(), GetError::Timeout.to_string());
    }
}
