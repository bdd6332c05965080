//! Bounded, latest-value cached buffers for feeding polling consumers.
//!
//! Background receivers decode messages and [`put`](CachedChannel::put) them;
//! a UI loop running at a fixed rate calls [`poll`](CachedChannel::poll) and
//! always gets something to draw: the next queued message if one arrived,
//! otherwise the last one it saw.
//!
//! ```
//! use scopebuf::{CachedChannel, GetError};
//!
//! let buffer = CachedChannel::<u32>::new(2, false);
//!
//! buffer.try_put(1);
//! buffer.try_put(2);
//! buffer.try_put(3); // full: dropped and counted
//!
//! assert_eq!(buffer.dropped(), 1);
//! assert_eq!(buffer.poll(), 1);
//! assert_eq!(buffer.poll(), 2);
//! assert_eq!(buffer.poll(), 2); // nothing new, cached value
//! assert_eq!(buffer.get(false, None, false), Err(GetError::Empty));
//! ```

pub mod config;
pub mod error;
pub mod sync;
mod trace;

pub use config::ChannelConfig;
pub use error::{ConfigError, GetError, PutError};
pub use sync::Timeout;
pub use sync::buffer::CachedChannel;
pub use sync::overrun::OverrunTracker;
pub use trace::init_tracing;
