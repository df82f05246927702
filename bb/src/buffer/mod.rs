//! Fixed-capacity circular buffer
//!
//! Both execution modes drive the same index-advance logic. Synchronized
//! callers go through the checked `try_write`/`try_read`; race-injected callers
//! use the unchecked `write`/`read`, whose outcomes report overwrites and
//! stale reads instead of preventing them.

mod ring;

pub use ring::{BufferSnapshot, CircularBuffer, ReadOutcome, WriteOutcome};
