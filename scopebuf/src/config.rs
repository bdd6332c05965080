//! Per-channel construction settings.
//!
//! A composition root typically creates one buffer per (message type,
//! logical channel) pair. [`ChannelConfig`] captures the knobs for one such
//! buffer and can be loaded from any serde format alongside the rest of an
//! application's settings:
//!
//! ```
//! use scopebuf::ChannelConfig;
//!
//! let config: ChannelConfig =
//!     serde_json::from_str(r#"{ "capacity": 5, "report_overruns": true }"#).unwrap();
//!
//! assert_eq!(config.capacity, 5);
//! assert_eq!(config.min_dropped_before_report, 20);
//! assert!(config.name.is_none());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of drops that must accumulate before the first overrun report.
pub const DEFAULT_MIN_DROPPED_BEFORE_REPORT: u64 = 20;

/// Capacity used by [`ChannelConfig::default`].
pub const DEFAULT_CAPACITY: usize = 5;

/// Settings for a single [`CachedChannel`](crate::CachedChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum number of undelivered items held at once.
    pub capacity: usize,
    /// Emit a rate-limited warning when non-blocking puts are dropped.
    pub report_overruns: bool,
    /// Label used in diagnostics.
    /// If `None`, the buffer is named after its message type.
    pub name: Option<String>,
    /// Drops required before the first report is emitted.
    pub min_dropped_before_report: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            report_overruns: false,
            name: None,
            min_dropped_before_report: DEFAULT_MIN_DROPPED_BEFORE_REPORT,
        }
    }
}

impl ChannelConfig {
    /// Creates a config with the given capacity and default everything else.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_report_overruns(mut self, enabled: bool) -> Self {
        self.report_overruns = enabled;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_min_dropped_before_report(mut self, threshold: u64) -> Self {
        self.min_dropped_before_report = threshold;
        self
    }

    /// Checks that a buffer can be built from this config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if `capacity` is 0.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
