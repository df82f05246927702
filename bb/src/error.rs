//! Simulator error types

use thiserror::Error;

use crate::domain::ActorId;

/// Errors that can occur while driving the simulation
///
/// None of these are fatal: the simulation recovers from each one and the
/// worst outcome is a single actor skipping a tick.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {field}={value} (clamped to {clamped})")]
    InvalidConfiguration { field: String, value: String, clamped: String },

    #[error("Actor {actor} is already in flight")]
    ReentrancyViolation { actor: ActorId },

    #[error("Lock misuse: release by {by} while {}", describe_owner(.owner))]
    LockMisuse { by: ActorId, owner: Option<ActorId> },

    #[error("Critical section failed for {actor}: {reason}")]
    CriticalSectionFailure { actor: ActorId, reason: String },

    #[error("Wait abandoned for {actor}: mutex was discarded")]
    WaitAbandoned { actor: ActorId },

    #[error("Invalid state transition for {actor}: {from} -> {to}")]
    InvalidTransition { actor: ActorId, from: String, to: String },

    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    #[error("Failed to spawn actor task: {0}")]
    Spawn(String),
}

fn describe_owner(owner: &Option<ActorId>) -> String {
    match owner {
        Some(owner) => format!("held by {}", owner),
        None => "unlocked".to_string(),
    }
}

impl SimError {
    /// Check if the error was raised inside a critical section
    pub fn is_critical(&self) -> bool {
        matches!(self, SimError::CriticalSectionFailure { .. })
    }
}
