//! Virtual simulation clock
//!
//! Time only moves through explicit steps, so runs are reproducible and tests
//! need no wall-clock sleeps. The clock tracks two kinds of deadlines:
//! - **Actor ticks:** one next-fire timestamp per actor, jittered
//! - **Timers:** one-shot virtual sleeps used for simulated transfers

mod core;
mod timer;

pub use self::core::{ClockConfig, SimulationClock};
pub use timer::TimerQueue;
