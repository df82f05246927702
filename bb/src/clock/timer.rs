//! One-shot virtual timers

use std::collections::BTreeMap;

use tokio::sync::oneshot;
use tracing::debug;

/// Pending sleeps ordered by (deadline, registration order)
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: BTreeMap<(u64, u64), oneshot::Sender<()>>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer firing at `deadline`
    pub fn register(&mut self, deadline: u64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(deadline, seq, "TimerQueue::register: called");
        self.timers.insert((deadline, seq), tx);
        rx
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Resolve every timer due at or before `now`, in order. Returns how many fired.
    pub fn fire_due(&mut self, now: u64) -> usize {
        let mut fired = 0;
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 > now {
                break;
            }
            // A dropped receiver means the sleeping task was cancelled
            let _ = entry.remove().send(());
            fired += 1;
        }
        if fired > 0 {
            debug!(now, fired, "TimerQueue::fire_due: fired timers");
        }
        fired
    }

    /// Drop every pending timer without firing it
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.timers.len();
        self.timers.clear();
        debug!(cancelled, "TimerQueue::cancel_all: called");
        cancelled
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_in_deadline_order() {
        let mut timers = TimerQueue::new();
        let mut late = timers.register(20);
        let mut early = timers.register(10);
        assert_eq!(timers.next_deadline(), Some(10));

        assert_eq!(timers.fire_due(15), 1);
        assert!(early.try_recv().is_ok());
        assert!(late.try_recv().is_err());

        assert_eq!(timers.fire_due(20), 1);
        assert!(late.try_recv().is_ok());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_same_deadline_keeps_registration_order() {
        let mut timers = TimerQueue::new();
        let _a = timers.register(5);
        let _b = timers.register(5);
        let keys: Vec<_> = timers.timers.keys().copied().collect();
        assert_eq!(keys, vec![(5, 0), (5, 1)]);
    }

    #[test]
    fn test_cancel_all_drops_senders() {
        let mut timers = TimerQueue::new();
        let mut rx = timers.register(5);
        assert_eq!(timers.cancel_all(), 1);
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        assert_eq!(timers.fire_due(100), 0);
    }
}
