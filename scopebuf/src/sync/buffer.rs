//! Bounded MPMC buffer that remembers the last delivered value.
//!
//! Decouples producers running at an unpredictable, bursty rate (network or
//! telemetry receivers) from a consumer that polls on its own fixed cadence
//! (a UI tick). Producers are never stalled by a slow consumer unless they
//! ask to be; the consumer always has *some* value to show, even when
//! nothing new arrived since the last poll.
//!
//! ```text
//!            │               capacity                   │
//!            ├──────────────────────────────────────────┤
//!            ┌──────┬──────┬──────┬──────┬──────┬───────┐       ┌────────┐
//!   put() ──>│      │      │      │      │      │       │──────>│ cached │──> get()
//!            └──────┴──────┴──────┴──────┴──────┴───────┘       └────────┘
//!              full + non-blocking put: item dropped, counted
//! ```
//!
//! # Overview
//!
//! - [`CachedChannel::put`] / [`CachedChannel::get`] - flag-driven operations
//! - [`CachedChannel::try_put`] / [`CachedChannel::poll`] - the producer and
//!   UI-tick fast paths
//! - [`CachedChannel::put_blocking`] / [`CachedChannel::get_blocking`] -
//!   waits bounded by a [`Timeout`]
//!
//! # Backpressure
//!
//! A non-blocking put into a full buffer drops the *incoming* item; what is
//! already queued keeps its FIFO order. Drops are counted and, if enabled,
//! reported as a single aggregated warning at the start of the next get once
//! the count exceeds [`DEFAULT_MIN_DROPPED_BEFORE_REPORT`]. See
//! [`OverrunTracker`] for the rate limit.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use scopebuf::CachedChannel;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct RobotStatus {
//!     robot_id: u32,
//!     battery_voltage: f32,
//! }
//!
//! let buffer = Arc::new(CachedChannel::<RobotStatus>::new(5, true));
//!
//! // Receiver thread
//! let producer = Arc::clone(&buffer);
//! thread::spawn(move || {
//!     producer.try_put(RobotStatus { robot_id: 3, battery_voltage: 15.8 });
//! })
//! .join()
//! .unwrap();
//!
//! // UI tick: delivers the new status, then keeps returning it
//! assert_eq!(buffer.poll().robot_id, 3);
//! assert_eq!(buffer.poll().robot_id, 3);
//! ```
//!
//! # Synchronization
//!
//! The queue, the cached value and the drop counters share one mutex, so a
//! reader never sees a torn cached value and a drop is never counted twice.
//! Blocking calls park on one of two condition variables and are woken by
//! the opposite operation; a wait that runs out of time leaves the buffer
//! untouched.
//!
//! [`DEFAULT_MIN_DROPPED_BEFORE_REPORT`]: crate::config::DEFAULT_MIN_DROPPED_BEFORE_REPORT

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::Timeout;
use super::overrun::OverrunTracker;
use crate::config::{ChannelConfig, DEFAULT_MIN_DROPPED_BEFORE_REPORT};
use crate::error::{ConfigError, GetError, PutError};
use crate::trace::{debug, trace, warn};

/// State guarded by the buffer's mutex.
struct State<T> {
    queue: VecDeque<T>,
    /// Last delivered item; seeded with the initial value.
    cached: T,
    overrun: OverrunTracker,
}

/// Bounded, multi-producer multi-consumer, latest-value cached buffer.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
pub struct CachedChannel<T> {
    state: Mutex<State<T>>,
    /// Signalled when an item is queued.
    not_empty: Condvar,
    /// Signalled when a slot is freed.
    not_full: Condvar,
    capacity: usize,
    name: String,
}

impl<T: Default> CachedChannel<T> {
    /// Creates a buffer seeded with `T::default()` as the cached value.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize, report_overruns: bool) -> Self {
        Self::with_initial(capacity, report_overruns, T::default())
    }

    /// Creates a buffer from a [`ChannelConfig`], seeded with `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if the config's capacity is 0.
    pub fn from_config(config: ChannelConfig) -> Result<Self, ConfigError> {
        Self::with_config(config, T::default())
    }
}

impl<T> CachedChannel<T> {
    /// Creates a buffer whose cached value starts as `initial`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_initial(capacity: usize, report_overruns: bool, initial: T) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");

        Self::build(
            capacity,
            report_overruns,
            DEFAULT_MIN_DROPPED_BEFORE_REPORT,
            default_name::<T>(),
            initial,
        )
    }

    /// Creates a buffer from a [`ChannelConfig`] with an explicit initial value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if the config's capacity is 0.
    pub fn with_config(config: ChannelConfig, initial: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let name = config.name.unwrap_or_else(default_name::<T>);
        Ok(Self::build(
            config.capacity,
            config.report_overruns,
            config.min_dropped_before_report,
            name,
            initial,
        ))
    }

    fn build(
        capacity: usize,
        report_overruns: bool,
        min_dropped_before_report: u64,
        name: String,
        initial: T,
    ) -> Self {
        debug!(buffer = %name, capacity, report_overruns, "created buffer");

        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                cached: initial,
                overrun: OverrunTracker::new(report_overruns, min_dropped_before_report),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            name,
        }
    }

    /// Inserts an item.
    ///
    /// With `block == false` this never waits: if the buffer is full the item
    /// is discarded, counted as a drop, and `Ok(())` is still returned.
    ///
    /// With `block == true` it waits for a free slot, for at most `timeout`
    /// (forever when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Timeout`] holding the item if a blocking put ran
    /// out of time.
    pub fn put(&self, item: T, block: bool, timeout: Option<Duration>) -> Result<(), PutError<T>> {
        if block {
            return self.put_blocking(item, Timeout::from(timeout));
        }
        self.try_put(item);
        Ok(())
    }

    /// Inserts an item without waiting.
    ///
    /// Returns `false` if the buffer was full and the item was dropped.
    #[inline]
    pub fn try_put(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.queue.len() >= self.capacity {
            state.overrun.record_drop();
            return false;
        }

        state.queue.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Waits until a slot is free, then inserts.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Timeout`] holding the item if the buffer stayed
    /// full past the deadline.
    pub fn put_blocking(&self, item: T, timeout: Timeout) -> Result<(), PutError<T>> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();

        while state.queue.len() >= self.capacity {
            if !park(&self.not_full, &mut state, deadline)
                && state.queue.len() >= self.capacity
            {
                trace!(buffer = %self.name, ?timeout, "put timed out");
                return Err(PutError::Timeout(item));
            }
        }

        state.queue.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Number of queued, undelivered items.
    ///
    /// A snapshot: concurrent puts and gets may change it immediately.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Label used in overrun reports.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total items dropped by non-blocking puts into a full buffer.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().overrun.dropped()
    }

    /// Drop count carried by the last overrun report (0 if none was emitted).
    #[must_use]
    pub fn last_reported_dropped(&self) -> u64 {
        self.state.lock().overrun.last_reported()
    }

    #[must_use]
    pub fn reports_overruns(&self) -> bool {
        self.state.lock().overrun.is_enabled()
    }

    /// Emits the aggregated overrun warning if one is due.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn report_overruns(&self, state: &mut State<T>) {
        if let Some(dropped) = state.overrun.take_report() {
            warn!(
                buffer = %self.name,
                dropped,
                "items dropped; consumer missed {dropped} items in total"
            );
        }
    }
}

impl<T: Clone> CachedChannel<T> {
    /// Retrieves the next item, or the cached one.
    ///
    /// Before anything else, emits the overrun warning if one is due; this
    /// happens on every call, whether or not data is waiting and before any
    /// blocking wait.
    ///
    /// | queue | `block` | outcome |
    /// |-------|---------|---------|
    /// | non-empty | any | head item, which also becomes the cached value |
    /// | empty | `false` | cached value if `return_cached`, else [`GetError::Empty`] |
    /// | empty | `true` | waits up to `timeout` (forever when `None`); on expiry cached value if `return_cached`, else [`GetError::Timeout`] |
    ///
    /// # Errors
    ///
    /// Only when `return_cached` is `false`: [`GetError::Empty`] if nothing
    /// was queued on a non-blocking call, [`GetError::Timeout`] if a blocking
    /// call ran out of time.
    pub fn get(
        &self,
        block: bool,
        timeout: Option<Duration>,
        return_cached: bool,
    ) -> Result<T, GetError> {
        if block {
            self.get_blocking(Timeout::from(timeout), return_cached)
        } else {
            let mut state = self.state.lock();
            self.report_overruns(&mut state);

            if let Some(item) = self.deliver(&mut state) {
                return Ok(item);
            }
            if return_cached {
                Ok(state.cached.clone())
            } else {
                Err(GetError::Empty)
            }
        }
    }

    /// Non-blocking get that falls back to the cached value.
    ///
    /// This is the steady-state call for a fixed-rate UI tick: it never waits
    /// and never fails.
    #[inline]
    #[must_use]
    pub fn poll(&self) -> T {
        let mut state = self.state.lock();
        self.report_overruns(&mut state);

        match self.deliver(&mut state) {
            Some(item) => item,
            None => state.cached.clone(),
        }
    }

    /// Non-blocking get without the cached fallback.
    ///
    /// Returns `None` if nothing new is queued.
    #[inline]
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.get(false, None, false).ok()
    }

    /// Waits for the next item, for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GetError::Timeout`] if nothing arrived in time and
    /// `return_cached` is `false`.
    pub fn get_blocking(&self, timeout: Timeout, return_cached: bool) -> Result<T, GetError> {
        let mut state = self.state.lock();
        self.report_overruns(&mut state);

        let deadline = timeout.deadline();
        loop {
            if let Some(item) = self.deliver(&mut state) {
                return Ok(item);
            }
            if !park(&self.not_empty, &mut state, deadline) {
                break;
            }
        }

        // A put may have landed right as the deadline passed.
        if let Some(item) = self.deliver(&mut state) {
            return Ok(item);
        }

        trace!(buffer = %self.name, ?timeout, return_cached, "get timed out");
        if return_cached {
            Ok(state.cached.clone())
        } else {
            Err(GetError::Timeout)
        }
    }

    /// Removes every queued item, oldest first.
    ///
    /// For consumers that want every sample accumulated since their last
    /// tick rather than one per tick. The last drained item becomes the
    /// cached value; an empty buffer leaves the cache untouched.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        self.report_overruns(&mut state);

        let items: Vec<T> = state.queue.drain(..).collect();
        if let Some(last) = items.last() {
            state.cached = last.clone();
        }
        drop(state);

        if !items.is_empty() {
            self.not_full.notify_all();
        }
        items
    }

    /// Clone of the cached value, without consuming anything from the queue.
    #[must_use]
    pub fn cached(&self) -> T {
        self.state.lock().cached.clone()
    }

    /// Pops the head item into the cache and returns a copy of it.
    ///
    /// Wakes one blocked producer, if any.
    #[inline]
    fn deliver(&self, state: &mut State<T>) -> Option<T> {
        let item = state.queue.pop_front()?;
        state.cached = item.clone();
        self.not_full.notify_one();
        Some(item)
    }
}

impl<T> fmt::Debug for CachedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CachedChannel")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("size", &state.queue.len())
            .field("dropped", &state.overrun.dropped())
            .finish_non_exhaustive()
    }
}

/// Parks on `condvar` until notified or `deadline` passes.
///
/// Returns `false` only if the deadline passed. Spurious wakeups return
/// `true`; callers re-check their condition in a loop.
#[inline]
fn park<S>(condvar: &Condvar, guard: &mut MutexGuard<'_, S>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            condvar.wait(guard);
            true
        }
        Some(deadline) => !condvar.wait_until(guard, deadline).timed_out(),
    }
}

/// Diagnostic name derived from the message type, e.g. `"World buffer"`.
///
/// Module paths are stripped from the outer type; generic arguments are kept
/// as-is.
fn default_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let (path, generics) = full.split_at(full.find('<').unwrap_or(full.len()));
    let base = path.rsplit("::").next().unwrap_or(path);
    format!("{base}{generics} buffer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct World {
        sequence: u64,
    }

    fn world(sequence: u64) -> World {
        World { sequence }
    }

    #[test]
    fn test_basic_put_get() {
        let buffer = CachedChannel::<u64>::new(4, false);

        buffer.put(1, false, None).unwrap();
        buffer.put(2, false, None).unwrap();

        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.get(false, None, true), Ok(1));
        assert_eq!(buffer.get(false, None, true), Ok(2));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let buffer = CachedChannel::<u64>::new(4, false);

        for i in 0..10 {
            buffer.put(i, false, None).unwrap();
        }

        assert_eq!(buffer.size(), 4);
        assert_eq!(buffer.dropped(), 6);
        for i in 0..4 {
            assert_eq!(buffer.try_get(), Some(i));
        }
        assert_eq!(buffer.try_get(), None);
    }

    #[test]
    fn test_try_put_reports_acceptance() {
        let buffer = CachedChannel::<u64>::new(1, false);

        assert!(buffer.try_put(1));
        assert!(!buffer.try_put(2));
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn test_empty_without_cache_is_absent() {
        let buffer = CachedChannel::<World>::new(4, false);

        assert_eq!(buffer.get(false, None, false), Err(GetError::Empty));
        assert_eq!(buffer.try_get(), None);
    }

    #[test]
    fn test_empty_with_cache_returns_initial_value() {
        let buffer = CachedChannel::<World>::new(4, false);
        assert_eq!(buffer.poll(), World::default());

        let seeded = CachedChannel::with_initial(4, false, world(7));
        assert_eq!(seeded.poll(), world(7));
    }

    #[test]
    fn test_cached_value_repeats_until_new_item() {
        let buffer = CachedChannel::<World>::new(4, false);

        buffer.try_put(world(1));
        buffer.try_put(world(2));

        assert_eq!(buffer.poll(), world(1));
        assert_eq!(buffer.poll(), world(2));
        for _ in 0..5 {
            assert_eq!(buffer.poll(), world(2));
            assert_eq!(buffer.get(false, None, true), Ok(world(2)));
        }

        buffer.try_put(world(3));
        assert_eq!(buffer.poll(), world(3));
        assert_eq!(buffer.cached(), world(3));
    }

    #[test]
    fn test_cache_only_tracks_delivered_items() {
        let buffer = CachedChannel::<World>::new(4, false);

        buffer.try_put(world(1));
        assert_eq!(buffer.cached(), World::default());

        assert_eq!(buffer.poll(), world(1));
        assert_eq!(buffer.cached(), world(1));
    }

    #[test]
    fn test_blocking_get_timeout_without_cache() {
        let buffer = CachedChannel::<u64>::new(4, false);

        let start = Instant::now();
        let result = buffer.get(true, Some(Duration::from_millis(20)), false);

        assert_eq!(result, Err(GetError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_blocking_get_timeout_with_cache() {
        let buffer = CachedChannel::with_initial(4, false, 42u64);

        let result = buffer.get(true, Some(Duration::from_millis(10)), true);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_blocking_get_returns_queued_item_immediately() {
        let buffer = CachedChannel::<u64>::new(4, false);
        buffer.try_put(5);

        let start = Instant::now();
        assert_eq!(buffer.get(true, Some(Duration::from_secs(5)), false), Ok(5));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_blocking_get_wakes_on_put() {
        let buffer = Arc::new(CachedChannel::<u64>::new(4, false));

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.try_put(99);
        });

        assert_eq!(buffer.get_blocking(Timeout::Infinite, false), Ok(99));
        handle.join().unwrap();
    }

    #[test]
    fn test_blocking_put_timeout_returns_item() {
        let buffer = CachedChannel::<String>::new(1, false);
        buffer.try_put("hello".to_string());

        let result = buffer.put("world".to_string(), true, Some(Duration::from_millis(10)));

        assert_eq!(result, Err(PutError::Timeout("world".to_string())));
        assert_eq!(buffer.size(), 1);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_blocking_put_zero_timeout_on_full_buffer() {
        let buffer = CachedChannel::<u64>::new(1, false);
        buffer.try_put(1);

        let result = buffer.put_blocking(2, Timeout::Duration(Duration::ZERO));
        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_blocking_put_waits_for_free_slot() {
        let buffer = Arc::new(CachedChannel::<u64>::new(2, false));
        buffer.try_put(1);
        buffer.try_put(2);

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || producer.put(3, true, None));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(buffer.try_get(), Some(1));

        handle.join().unwrap().unwrap();
        assert_eq!(buffer.try_get(), Some(2));
        assert_eq!(buffer.try_get(), Some(3));
    }

    #[test]
    fn test_drain_returns_fifo_and_updates_cache() {
        let buffer = CachedChannel::<u64>::new(8, false);
        for i in 1..=5 {
            buffer.try_put(i);
        }

        assert_eq!(buffer.drain(), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.cached(), 5);
        assert!(buffer.drain().is_empty());
        assert_eq!(buffer.cached(), 5);
    }

    #[test]
    fn test_overrun_watermark_advances_on_get() {
        let buffer = CachedChannel::<u64>::new(1, true);

        for i in 0..22 {
            buffer.try_put(i);
        }
        assert_eq!(buffer.dropped(), 21);
        assert_eq!(buffer.last_reported_dropped(), 0);

        let _ = buffer.poll();
        assert_eq!(buffer.last_reported_dropped(), 21);

        // No growth, no new report
        let _ = buffer.poll();
        assert_eq!(buffer.last_reported_dropped(), 21);
    }

    #[test]
    fn test_overrun_report_precedes_blocking_delivery() {
        let config = ChannelConfig::new(1)
            .with_report_overruns(true)
            .with_min_dropped_before_report(0);
        let buffer = CachedChannel::<u64>::from_config(config).unwrap();
        buffer.try_put(1);
        buffer.try_put(2);

        let result = buffer.get(true, Some(Duration::from_millis(1)), false);
        assert_eq!(result, Ok(1));
        assert_eq!(buffer.last_reported_dropped(), 1);

        let result = buffer.get(true, Some(Duration::from_millis(1)), false);
        assert_eq!(result, Err(GetError::Timeout));
        assert_eq!(buffer.last_reported_dropped(), 1);
    }

    #[test]
    fn test_overrun_reporting_disabled() {
        let buffer = CachedChannel::<u64>::new(1, false);
        for i in 0..50 {
            buffer.try_put(i);
        }
        let _ = buffer.poll();

        assert!(!buffer.reports_overruns());
        assert_eq!(buffer.dropped(), 49);
        assert_eq!(buffer.last_reported_dropped(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = ChannelConfig::new(3)
            .with_name("PlayInfo buffer")
            .with_report_overruns(true)
            .with_min_dropped_before_report(0);
        let buffer = CachedChannel::<u64>::from_config(config).unwrap();

        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.name(), "PlayInfo buffer");

        for i in 0..4 {
            buffer.try_put(i);
        }
        let _ = buffer.poll();
        assert_eq!(buffer.last_reported_dropped(), 1);
    }

    #[test]
    fn test_from_config_rejects_zero_capacity() {
        let result = CachedChannel::<u64>::from_config(ChannelConfig::new(0));
        assert_eq!(result.unwrap_err(), ConfigError::ZeroCapacity);
    }

    #[test]
    #[should_panic(expected = "buffer capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = CachedChannel::<u64>::new(0, false);
    }

    #[test]
    fn test_default_name_strips_module_path() {
        assert_eq!(CachedChannel::<World>::new(1, false).name(), "World buffer");
        assert_eq!(CachedChannel::<u64>::new(1, false).name(), "u64 buffer");
        assert_eq!(
            default_name::<Vec<String>>(),
            "Vec<alloc::string::String> buffer"
        );
    }

    #[test]
    fn test_non_copy_type() {
        let buffer = CachedChannel::<String>::new(2, false);

        buffer.try_put("hello".to_string());
        buffer.try_put("world".to_string());

        assert_eq!(buffer.poll(), "hello");
        assert_eq!(buffer.poll(), "world");
        assert_eq!(buffer.poll(), "world");
    }

    #[test]
    fn test_debug_output() {
        let buffer = CachedChannel::<u64>::new(2, false);
        buffer.try_put(1);

        let debug = format!("{buffer:?}");
        assert!(debug.contains("capacity: 2"));
        assert!(debug.contains("size: 1"));
    }
}
