//! Turn scheduler
//!
//! Grants exclusive eligibility to act, rotating round-robin among actors of
//! the same role. This decides *who may try*; the mutex decides *who wins*
//! when several eligible actors contend.

mod core;

pub use self::core::{TurnScheduler, TurnSnapshot, TurnStats};
