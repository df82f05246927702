//! Closed per-role state machines
//!
//! Every legal transition is listed in `allows`. Anything else is rejected
//! with `InvalidTransition` and the state is left untouched. Forced resets to
//! idle (failure recovery, stop) bypass the table.

use serde::Serialize;
use tracing::warn;

use crate::domain::{ActorId, SyncMode};
use crate::error::SimError;

/// Behaviour shared by the per-role state enums
pub trait ActorState: Copy + Eq + std::fmt::Debug + std::fmt::Display {
    /// Whether `self -> next` is a legal transition in `mode`
    fn allows(self, next: Self, mode: SyncMode) -> bool;
}

/// Move `current` to `next`, rejecting transitions outside the table
pub(crate) fn transition<S: ActorState>(
    actor: ActorId,
    current: &mut S,
    next: S,
    mode: SyncMode,
) -> Result<(), SimError> {
    if *current == next {
        return Ok(());
    }
    if !current.allows(next, mode) {
        warn!(%actor, from = %current, to = %next, %mode, "Rejected invalid state transition");
        return Err(SimError::InvalidTransition {
            actor,
            from: current.to_string(),
            to: next.to_string(),
        });
    }
    *current = next;
    Ok(())
}

/// Producer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProducerState {
    #[default]
    Idle,
    WaitingTurn,
    Producing,
    Waiting,
    HoldingLock,
}

impl ActorState for ProducerState {
    fn allows(self, next: Self, mode: SyncMode) -> bool {
        use ProducerState::*;
        match mode {
            SyncMode::Synchronized => matches!(
                (self, next),
                (Idle, WaitingTurn)
                    | (Idle, Producing)
                    | (WaitingTurn, Producing)
                    | (Producing, Waiting)
                    | (Producing, HoldingLock)
                    | (Waiting, HoldingLock)
                    | (HoldingLock, Idle)
            ),
            SyncMode::Unsynchronized => matches!((self, next), (Idle, Producing) | (Producing, Idle)),
        }
    }
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::WaitingTurn => write!(f, "waiting-turn"),
            Self::Producing => write!(f, "producing"),
            Self::Waiting => write!(f, "waiting"),
            Self::HoldingLock => write!(f, "holding-lock"),
        }
    }
}

/// Consumer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumerState {
    #[default]
    Idle,
    WaitingTurn,
    Consuming,
    Waiting,
    HoldingLock,
}

impl ActorState for ConsumerState {
    fn allows(self, next: Self, mode: SyncMode) -> bool {
        use ConsumerState::*;
        match mode {
            SyncMode::Synchronized => matches!(
                (self, next),
                (Idle, WaitingTurn)
                    | (Idle, Consuming)
                    | (WaitingTurn, Consuming)
                    | (Consuming, Waiting)
                    | (Consuming, HoldingLock)
                    | (Waiting, HoldingLock)
                    | (HoldingLock, Idle)
            ),
            SyncMode::Unsynchronized => matches!((self, next), (Idle, Consuming) | (Consuming, Idle)),
        }
    }
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::WaitingTurn => write!(f, "waiting-turn"),
            Self::Consuming => write!(f, "consuming"),
            Self::Waiting => write!(f, "waiting"),
            Self::HoldingLock => write!(f, "holding-lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNC: SyncMode = SyncMode::Synchronized;
    const UNSYNC: SyncMode = SyncMode::Unsynchronized;

    #[test]
    fn test_producer_sync_happy_path() {
        let id = ActorId::producer(0);
        let mut state = ProducerState::Idle;
        for next in [
            ProducerState::WaitingTurn,
            ProducerState::Producing,
            ProducerState::Waiting,
            ProducerState::HoldingLock,
            ProducerState::Idle,
        ] {
            transition(id, &mut state, next, SYNC).unwrap();
        }
        assert_eq!(state, ProducerState::Idle);
    }

    #[test]
    fn test_self_transition_is_noop() {
        let mut state = ConsumerState::WaitingTurn;
        transition(ActorId::consumer(0), &mut state, ConsumerState::WaitingTurn, SYNC).unwrap();
        assert_eq!(state, ConsumerState::WaitingTurn);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut state = ProducerState::Idle;
        let err = transition(ActorId::producer(1), &mut state, ProducerState::HoldingLock, SYNC).unwrap_err();
        assert!(matches!(err, SimError::InvalidTransition { .. }));
        assert!(err.to_string().contains("idle -> holding-lock"));
        assert_eq!(state, ProducerState::Idle, "state unchanged on rejection");
    }

    #[test]
    fn test_unsync_only_visits_idle_and_working() {
        assert!(ConsumerState::Idle.allows(ConsumerState::Consuming, UNSYNC));
        assert!(ConsumerState::Consuming.allows(ConsumerState::Idle, UNSYNC));
        assert!(!ConsumerState::Idle.allows(ConsumerState::WaitingTurn, UNSYNC));
        assert!(!ConsumerState::Consuming.allows(ConsumerState::HoldingLock, UNSYNC));
        assert!(!ProducerState::Producing.allows(ProducerState::Waiting, UNSYNC));
    }

    #[test]
    fn test_sync_cannot_skip_lock() {
        assert!(!ProducerState::Producing.allows(ProducerState::Idle, SYNC));
        assert!(!ConsumerState::Waiting.allows(ConsumerState::Idle, SYNC));
    }

    #[test]
    fn test_state_serde_kebab_case() {
        let json = serde_json::to_string(&ProducerState::HoldingLock).unwrap();
        assert_eq!(json, "\"holding-lock\"");
        assert_eq!(ConsumerState::WaitingTurn.to_string(), "waiting-turn");
    }
}
