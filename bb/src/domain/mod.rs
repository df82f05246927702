//! Domain types shared by every simulator component
//!
//! - [`ActorId`] / [`Role`] - identity of producers and consumers
//! - [`SyncMode`] - synchronized vs race-injected execution
//! - [`Item`] - provenance-tagged buffer payload

mod id;
mod item;
mod mode;

pub use id::{ActorId, Role};
pub use item::Item;
pub use mode::SyncMode;
