//! Integration tests for boundbuf
//!
//! These tests drive whole simulations through the public API and the `bb`
//! binary.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use assert_cmd::Command;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use predicates::prelude::*;
use proptest::prelude::*;
use tempfile::TempDir;

use boundbuf::{
    ActorId, ConsumerState, CooperativeMutex, MutexSnapshot, ProducerState, RunState, SimConfig, SimEvent, Simulation,
    SyncMode, TickOutcome, TurnSnapshot,
};

fn base_config(mode: SyncMode) -> SimConfig {
    SimConfig {
        producers: 1,
        consumers: 1,
        capacity: 1,
        producer_delay_ms: 100,
        consumer_delay_ms: 100,
        mode,
        transfer_ms: 0,
        jitter_ms: 0,
        seed: Some(11),
        event_log_capacity: 10_000,
        ..Default::default()
    }
}

fn started(config: SimConfig) -> Simulation {
    let mut sim = Simulation::new(config);
    assert!(sim.start());
    sim
}

fn produced_by(sim: &Simulation) -> Vec<ActorId> {
    sim.events()
        .into_iter()
        .filter_map(|r| match r.event {
            SimEvent::Produced { actor, .. } => Some(actor),
            _ => None,
        })
        .collect()
}

fn consumed_by(sim: &Simulation) -> Vec<ActorId> {
    sim.events()
        .into_iter()
        .filter_map(|r| match r.event {
            SimEvent::Consumed { actor, .. } => Some(actor),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Synchronized Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_sync_occupancy_and_single_lock_holder(
        producers in 1usize..4,
        consumers in 1usize..4,
        capacity in 1usize..6,
        producer_delay_ms in 100u64..1_000,
        consumer_delay_ms in 100u64..1_000,
        transfer_ms in 0u64..300,
        jitter_ms in 0u64..200,
        seed in any::<u64>(),
    ) {
        let mut sim = started(SimConfig {
            producers,
            consumers,
            capacity,
            producer_delay_ms,
            consumer_delay_ms,
            transfer_ms,
            jitter_ms,
            seed: Some(seed),
            ..Default::default()
        });

        for _ in 0..200 {
            if sim.step().is_none() {
                break;
            }
            let snap = sim.snapshot();
            prop_assert!(snap.buffer.occupancy >= 0);
            prop_assert!(snap.buffer.occupancy <= capacity as i64);
            prop_assert_eq!(snap.buffer.occupancy as usize, snap.buffer.filled());
            prop_assert!(snap.holding_lock_count() <= 1);

            if let Some(holder) = snap.producers.iter().find(|p| p.state == ProducerState::HoldingLock) {
                prop_assert!(holder.in_flight);
                prop_assert_eq!(snap.mutex.owner, Some(holder.id));
            }
            if let Some(holder) = snap.consumers.iter().find(|c| c.state == ConsumerState::HoldingLock) {
                prop_assert!(holder.in_flight);
                prop_assert_eq!(snap.mutex.owner, Some(holder.id));
            }

            let stats = snap.stats;
            prop_assert_eq!(stats.produced as i64 - stats.consumed as i64, snap.buffer.occupancy);
            prop_assert_eq!(stats.overwrites + stats.stale_reads, 0);
        }
    }
}

#[test]
fn test_fairness_window_per_role() {
    let mut sim = started(SimConfig {
        producers: 3,
        consumers: 3,
        capacity: 4,
        producer_delay_ms: 300,
        consumer_delay_ms: 350,
        jitter_ms: 150,
        transfer_ms: 40,
        ..base_config(SyncMode::Synchronized)
    });
    sim.advance(60_000);

    for (ops, role_count) in [(produced_by(&sim), 3), (consumed_by(&sim), 3)] {
        assert!(ops.len() > 2 * role_count, "too few operations: {}", ops.len());
        for window in ops.windows(role_count) {
            let mut indices: Vec<_> = window.iter().map(|a| a.index).collect();
            indices.sort();
            assert_eq!(indices, vec![0, 1, 2], "window {:?}", window);
        }
    }
}

#[test]
fn test_mutex_fifo_between_actors() {
    let mut pool = LocalPool::new();
    let mutex = Rc::new(CooperativeMutex::new());
    let order = Rc::new(RefCell::new(Vec::new()));
    assert!(mutex.try_acquire(ActorId::consumer(0)));

    for id in [ActorId::producer(1), ActorId::producer(0)] {
        let (m, o) = (mutex.clone(), order.clone());
        pool.spawner()
            .spawn_local(async move {
                m.acquire(id).await.unwrap();
                o.borrow_mut().push(id);
                m.release(id).unwrap();
            })
            .unwrap();
        pool.run_until_stalled();
    }

    mutex.release(ActorId::consumer(0)).unwrap();
    pool.run_until_stalled();
    assert_eq!(*order.borrow(), vec![ActorId::producer(1), ActorId::producer(0)]);
    assert_eq!(mutex.snapshot(), MutexSnapshot::default());
}

#[test]
fn test_round_trip_advances_both_indices() {
    let mut sim = started(SimConfig {
        capacity: 3,
        ..base_config(SyncMode::Synchronized)
    });

    assert_eq!(sim.tick(ActorId::producer(0)).unwrap(), TickOutcome::Started);
    assert_eq!(sim.tick(ActorId::consumer(0)).unwrap(), TickOutcome::Started);

    let snap = sim.snapshot();
    assert_eq!(snap.buffer.occupancy, 0);
    assert_eq!(snap.buffer.write_index, 1);
    assert_eq!(snap.buffer.read_index, 1);
    assert_eq!(snap.turns, TurnSnapshot::default(), "single actors wrap back to 0");
}

#[test]
fn test_turn_denied_sets_waiting_turn() {
    // Every scheduled tick lands at t=0, then not again until t=10000
    let mut sim = started(SimConfig {
        producers: 2,
        consumers: 0,
        transfer_ms: 100,
        capacity: 4,
        producer_delay_ms: 10_000,
        stagger_fraction: 0.0,
        ..base_config(SyncMode::Synchronized)
    });

    assert_eq!(sim.tick(ActorId::producer(1)).unwrap(), TickOutcome::NotTurn);
    assert_eq!(sim.snapshot().producers[1].state, ProducerState::WaitingTurn);

    sim.tick(ActorId::producer(0)).unwrap();
    assert_eq!(sim.tick(ActorId::producer(1)).unwrap(), TickOutcome::NotTurn);

    // P0's transfer completes and passes the turn
    while sim.snapshot().producers[0].in_flight {
        sim.step();
    }
    assert_eq!(sim.tick(ActorId::producer(1)).unwrap(), TickOutcome::Started);
    assert_eq!(sim.snapshot().producers[1].state, ProducerState::HoldingLock);
}

// =============================================================================
// Race Injection
// =============================================================================

#[test]
fn test_race_injection_overwrites_single_slot() {
    let mut sim = started(SimConfig {
        producers: 2,
        consumers: 0,
        ..base_config(SyncMode::Unsynchronized)
    });

    assert_eq!(sim.tick(ActorId::producer(0)).unwrap(), TickOutcome::Started);
    assert_eq!(sim.tick(ActorId::producer(1)).unwrap(), TickOutcome::Started);

    let snap = sim.snapshot();
    assert_eq!(snap.buffer.filled(), 1);
    assert_eq!(snap.buffer.occupancy, 2, "counter drifts past capacity");
    assert_eq!(snap.stats.overwrites, 1);
    assert!(sim.events().iter().any(|r| matches!(
        r.event,
        SimEvent::Overwrite { actor, .. } if actor == ActorId::producer(1)
    )));
}

#[test]
fn test_unsync_read_of_empty_slot_is_stale() {
    let mut sim = started(SimConfig {
        producers: 0,
        ..base_config(SyncMode::Unsynchronized)
    });

    sim.tick(ActorId::consumer(0)).unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.buffer.occupancy, -1);
    assert_eq!(snap.stats.stale_reads, 1);
    assert_eq!(snap.consumers[0].state, ConsumerState::Idle);
    assert_eq!(snap.consumers[0].completed, 1);
}

#[test]
fn test_unsync_keeps_turns_and_stays_idle_when_denied() {
    let mut sim = started(SimConfig {
        producers: 2,
        capacity: 4,
        ..base_config(SyncMode::Unsynchronized)
    });

    assert_eq!(sim.tick(ActorId::producer(1)).unwrap(), TickOutcome::NotTurn);
    assert_eq!(sim.snapshot().producers[1].state, ProducerState::Idle);
    assert!(!sim.snapshot().mutex.locked, "unsynchronized runs never lock");
}

// =============================================================================
// Failure Recovery
// =============================================================================

#[test]
fn test_injected_fault_releases_lock_and_recovers() {
    let mut sim = started(base_config(SyncMode::Synchronized));

    // Fill the single slot, then park P0 on not_full
    sim.tick(ActorId::producer(0)).unwrap();
    sim.tick(ActorId::producer(0)).unwrap();
    assert_eq!(sim.snapshot().producers[0].state, ProducerState::Waiting);
    sim.inject_fault(ActorId::producer(0)).unwrap();

    // C0 frees the slot and hands the lock to P0, whose critical section fails
    sim.tick(ActorId::consumer(0)).unwrap();

    let snap = sim.snapshot();
    assert!(!snap.mutex.locked);
    assert_eq!(snap.mutex.owner, None);
    assert_eq!(snap.producers[0].state, ProducerState::Idle);
    assert!(!snap.producers[0].in_flight);
    assert_eq!(snap.buffer.occupancy, 0);
    assert_eq!(snap.stats.failures, 1);
    assert_eq!(snap.producers[0].completed, 1, "failed operation is not counted");

    // Other actors and the next attempt proceed normally
    assert_eq!(sim.tick(ActorId::producer(0)).unwrap(), TickOutcome::Started);
    assert_eq!(sim.snapshot().buffer.occupancy, 1);
    assert_eq!(sim.run_state(), RunState::Running);
}

#[test]
fn test_fault_in_unsync_mode_skips_write() {
    let mut sim = started(base_config(SyncMode::Unsynchronized));
    sim.inject_fault(ActorId::producer(0)).unwrap();
    sim.tick(ActorId::producer(0)).unwrap();

    let snap = sim.snapshot();
    assert_eq!(snap.buffer.occupancy, 0);
    assert_eq!(snap.stats.failures, 1);
    assert!(matches!(
        sim.events().last().map(|r| &r.event),
        Some(SimEvent::CriticalSectionFailure { reason, .. }) if reason == "injected fault"
    ));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_reset_restores_initial_state() {
    let mut sim = started(SimConfig {
        producers: 2,
        consumers: 2,
        capacity: 3,
        transfer_ms: 120,
        ..base_config(SyncMode::Synchronized)
    });
    sim.advance(5_000);
    assert!(sim.snapshot().stats.produced > 0);

    sim.reset();
    let snap = sim.snapshot();
    assert_eq!(snap.run_state, RunState::Stopped);
    assert_eq!(snap.time_ms, 0);
    assert_eq!(snap.buffer.occupancy, 0);
    assert_eq!(snap.buffer.write_index, 0);
    assert_eq!(snap.buffer.read_index, 0);
    assert_eq!(snap.buffer.filled(), 0);
    assert!(snap.all_idle());
    assert_eq!(snap.mutex, MutexSnapshot::default());
    assert_eq!(snap.turns, TurnSnapshot::default());
}

#[test]
fn test_same_seed_replays_identically() {
    let config = SimConfig {
        producers: 2,
        consumers: 3,
        capacity: 2,
        producer_delay_ms: 400,
        consumer_delay_ms: 250,
        jitter_ms: 120,
        transfer_ms: 90,
        ..base_config(SyncMode::Synchronized)
    };

    let mut a = started(config.clone());
    let mut b = started(config);
    a.advance(8_000);
    b.advance(8_000);
    assert_eq!(a.events(), b.events());
    assert_eq!(a.snapshot(), b.snapshot());
}

#[test]
fn test_pause_mid_wait_then_resume() {
    let mut sim = started(base_config(SyncMode::Synchronized));
    sim.tick(ActorId::producer(0)).unwrap();
    sim.tick(ActorId::producer(0)).unwrap();
    assert_eq!(sim.snapshot().producers[0].state, ProducerState::Waiting);

    assert!(sim.pause());
    let frozen = sim.snapshot();
    assert_eq!(sim.tick(ActorId::consumer(0)).unwrap(), TickOutcome::Suppressed);
    assert_eq!(sim.advance(10_000), 0);
    assert_eq!(sim.step(), None);
    let still = sim.snapshot();
    assert_eq!(still.time_ms, frozen.time_ms);
    assert_eq!(still.buffer, frozen.buffer);
    assert_eq!(still.mutex, frozen.mutex);
    assert_eq!(still.producers, frozen.producers);

    assert!(sim.resume());
    sim.tick(ActorId::consumer(0)).unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.stats.produced, 2);
    assert_eq!(snap.stats.consumed, 1);
    assert_eq!(snap.buffer.occupancy, 1);
    assert!(snap.all_idle());

    let items: Vec<u64> = sim
        .events()
        .into_iter()
        .filter_map(|r| match r.event {
            SimEvent::Produced { item, .. } | SimEvent::Consumed { item, .. } => Some(item.seq),
            _ => None,
        })
        .collect();
    assert_eq!(items, vec![1, 1, 2], "nothing skipped or duplicated");
}

#[test]
fn test_stop_mid_transfer_cancels_cleanly() {
    let mut sim = started(SimConfig {
        transfer_ms: 500,
        capacity: 2,
        ..base_config(SyncMode::Synchronized)
    });
    sim.tick(ActorId::producer(0)).unwrap();
    assert!(sim.snapshot().mutex.locked);

    sim.stop();
    let snap = sim.snapshot();
    assert!(snap.all_idle());
    assert!(!snap.mutex.locked);
    assert_eq!(sim.next_deadline(), None);
    assert_eq!(snap.buffer.occupancy, 0, "cancelled transfer never committed");

    // A new run starts from scratch
    assert!(sim.start());
    assert_eq!(sim.snapshot().stats.produced, 0);
}

#[test]
fn test_drain_events_empties_log() {
    let mut sim = started(base_config(SyncMode::Synchronized));
    sim.tick(ActorId::producer(0)).unwrap();
    let drained = sim.drain_events();
    assert!(matches!(drained.first().map(|r| &r.event), Some(SimEvent::Started { .. })));
    assert!(sim.events().is_empty());
    assert_eq!(sim.snapshot().stats.produced, 1, "totals survive draining");
}

#[tokio::test]
async fn test_driven_from_tokio_interval() {
    let mut sim = started(SimConfig {
        producers: 2,
        consumers: 2,
        capacity: 3,
        ..base_config(SyncMode::Synchronized)
    });

    let mut interval = tokio::time::interval(Duration::from_millis(1));
    for _ in 0..20 {
        interval.tick().await;
        sim.advance(250);
    }
    assert_eq!(sim.now(), 5_000);
    assert!(sim.snapshot().stats.consumed > 0);
}

// =============================================================================
// CLI
// =============================================================================

fn bb(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bb").expect("binary builds");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_config_prints_yaml() {
    let home = TempDir::new().expect("Failed to create temp dir");
    bb(&home)
        .args(["config", "--capacity", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity: 7"))
        .stdout(predicate::str::contains("producer-delay-ms: 1500"));
}

#[test]
fn test_cli_reads_local_config_file() {
    let home = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(home.path().join(".boundbuf.yml"), "consumers: 5\nmode: unsynchronized\n").unwrap();
    bb(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("consumers: 5"))
        .stdout(predicate::str::contains("mode: unsynchronized"));
}

#[test]
fn test_cli_race_reports_overwrite() {
    let home = TempDir::new().expect("Failed to create temp dir");
    bb(&home)
        .arg("race")
        .assert()
        .success()
        .stdout(predicate::str::contains("overwrote"))
        .stdout(predicate::str::contains("Slots filled: 1"));
}

#[test]
fn test_cli_run_json_summary() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let output = bb(&home)
        .args(["run", "--duration-ms", "4000", "--every-ms", "1000", "--seed", "5", "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["snapshots"].as_array().map(Vec::len), Some(4));
    assert_eq!(report["final"]["time-ms"], 4000);
    assert_eq!(report["final"]["seed"], 5);
}

#[test]
fn test_cli_run_rejects_unknown_fault_target() {
    let home = TempDir::new().expect("Failed to create temp dir");
    bb(&home)
        .args(["run", "--duration-ms", "100", "--fault", "P9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("P9"));
}
