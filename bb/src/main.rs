//! boundbuf - Bounded-Buffer Producer/Consumer Simulator
//!
//! CLI entry point for running, watching and racing simulations.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::{ColoredString, Colorize};
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use boundbuf::cli::{Cli, Command, OutputFormat, get_log_path};
use boundbuf::{
    ActorId, ConsumerState, EventRecord, Item, ProducerState, SimConfig, SimEvent, SimSnapshot, Simulation, SyncMode,
};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = SimConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            sim,
            duration_ms,
            every_ms,
            faults,
            format,
        } => {
            debug!(duration_ms, every_ms, ?faults, %format, "main: matched Run command");
            cmd_run(sim.apply(config), duration_ms, every_ms, &faults, format)
        }
        Command::Watch {
            sim,
            tick_ms,
            step_ms,
            duration_ms,
        } => {
            debug!(tick_ms, step_ms, duration_ms, "main: matched Watch command");
            cmd_watch(sim.apply(config), tick_ms, step_ms, duration_ms).await
        }
        Command::Race { producers, format } => {
            debug!(producers, %format, "main: matched Race command");
            cmd_race(producers, format)
        }
        Command::Config { sim } => {
            debug!("main: matched Config command");
            cmd_config(sim.apply(config))
        }
    }
}

/// Summary written by `run --format json`
#[derive(Serialize)]
struct RunReport {
    snapshots: Vec<SimSnapshot>,
    #[serde(rename = "final")]
    summary: SimSnapshot,
    anomalies: Vec<EventRecord>,
}

/// Run in virtual time and report
fn cmd_run(config: SimConfig, duration_ms: u64, every_ms: u64, faults: &[ActorId], format: OutputFormat) -> Result<()> {
    debug!(?config, "cmd_run: called");
    let mut sim = Simulation::new(config);
    sim.start();
    for actor in faults {
        sim.inject_fault(*actor)
            .context(format!("Failed to inject fault into {}", actor))?;
    }

    let chunk = if every_ms == 0 { duration_ms } else { every_ms };
    let mut snapshots = Vec::new();
    let mut anomalies = Vec::new();
    let mut elapsed = 0;
    while elapsed < duration_ms {
        let window = chunk.min(duration_ms - elapsed).max(1);
        sim.advance(window);
        elapsed += window;

        let events = sim.drain_events();
        anomalies.extend(events.iter().filter(|e| is_reportable(&e.event)).cloned());
        if every_ms > 0 {
            let snapshot = sim.snapshot();
            match format {
                OutputFormat::Text => {
                    println!("{}", render_line(&snapshot));
                    for record in &events {
                        println!("{}", render_event(record));
                    }
                }
                OutputFormat::Json => snapshots.push(snapshot),
            }
        }
    }

    let summary = sim.snapshot();
    sim.stop();
    info!(produced = summary.stats.produced, consumed = summary.stats.consumed, "Run complete");

    match format {
        OutputFormat::Text => print_summary(&summary, &anomalies),
        OutputFormat::Json => {
            let report = RunReport {
                snapshots,
                summary,
                anomalies,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Run against the wall clock until the duration elapses or Ctrl+C
async fn cmd_watch(config: SimConfig, tick_ms: u64, step_ms: u64, duration_ms: u64) -> Result<()> {
    debug!(?config, "cmd_watch: called");
    let mut sim = Simulation::new(config);
    sim.start();

    println!(
        "Watching {} simulation (seed {}). Press Ctrl+C to stop.",
        sim.snapshot().mode,
        sim.snapshot().seed
    );

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sim.advance(step_ms);
                for record in sim.drain_events() {
                    println!("{}", render_event(&record));
                }
                let snapshot = sim.snapshot();
                println!("{}", render_line(&snapshot));
                if duration_ms > 0 && snapshot.time_ms >= duration_ms {
                    debug!("cmd_watch: duration elapsed");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("cmd_watch: interrupted");
                println!();
                break;
            }
        }
    }

    let summary = sim.snapshot();
    sim.stop();
    print_summary(&summary, &[]);
    Ok(())
}

/// Summary written by `race --format json`
#[derive(Serialize)]
struct RaceReport {
    snapshot: SimSnapshot,
    anomalies: Vec<EventRecord>,
}

/// Canned race injection: several producers, one slot, nobody consuming
fn cmd_race(producers: usize, format: OutputFormat) -> Result<()> {
    debug!(producers, "cmd_race: called");
    let config = SimConfig {
        producers: producers.max(2),
        consumers: 0,
        capacity: 1,
        mode: SyncMode::Unsynchronized,
        transfer_ms: 0,
        seed: Some(0),
        ..Default::default()
    };
    let mut sim = Simulation::new(config);
    sim.start();
    for index in 0..sim.config().producers {
        sim.tick(ActorId::producer(index))
            .context(format!("Failed to tick P{}", index))?;
    }

    let snapshot = sim.snapshot();
    let anomalies: Vec<_> = sim.events().into_iter().filter(|e| e.event.is_anomaly()).collect();
    sim.stop();

    match format {
        OutputFormat::Text => {
            println!("{}", "Race injection: unsynchronized producers, capacity 1".bold());
            for record in &anomalies {
                println!("{}", render_event(record));
            }
            println!(
                "Slots filled: {}  occupancy counter: {}  overwrites: {}",
                snapshot.buffer.filled(),
                snapshot.buffer.occupancy.to_string().red(),
                snapshot.stats.overwrites.to_string().red().bold()
            );
        }
        OutputFormat::Json => {
            let report = RaceReport { snapshot, anomalies };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Print the effective configuration as YAML
fn cmd_config(config: SimConfig) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn is_reportable(event: &SimEvent) -> bool {
    event.is_anomaly() || matches!(event, SimEvent::CriticalSectionFailure { .. } | SimEvent::LockMisuse { .. })
}

fn paint_item(snapshot: &SimSnapshot, item: &Item) -> ColoredString {
    let color = snapshot
        .producers
        .get(item.producer.index)
        .map(|p| p.color)
        .unwrap_or("white");
    item.to_string().color(color)
}

fn paint_producer(state: ProducerState) -> ColoredString {
    let label = state.to_string();
    match state {
        ProducerState::Idle => label.dimmed(),
        ProducerState::WaitingTurn => label.yellow(),
        ProducerState::Producing => label.cyan(),
        ProducerState::Waiting => label.magenta(),
        ProducerState::HoldingLock => label.green().bold(),
    }
}

fn paint_consumer(state: ConsumerState) -> ColoredString {
    let label = state.to_string();
    match state {
        ConsumerState::Idle => label.dimmed(),
        ConsumerState::WaitingTurn => label.yellow(),
        ConsumerState::Consuming => label.cyan(),
        ConsumerState::Waiting => label.magenta(),
        ConsumerState::HoldingLock => label.green().bold(),
    }
}

fn render_line(snapshot: &SimSnapshot) -> String {
    let slots: Vec<String> = snapshot
        .buffer
        .slots
        .iter()
        .map(|slot| match slot {
            Some(item) => paint_item(snapshot, item).to_string(),
            None => "--".dimmed().to_string(),
        })
        .collect();

    let mut actors: Vec<String> = snapshot
        .producers
        .iter()
        .map(|p| format!("{}:{}", p.id.to_string().color(p.color), paint_producer(p.state)))
        .collect();
    actors.extend(
        snapshot
            .consumers
            .iter()
            .map(|c| format!("{}:{}", c.id, paint_consumer(c.state))),
    );

    let owner = snapshot
        .mutex
        .owner
        .map(|o| o.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "[{:>8}ms] [{}] {}/{} lock:{} {}",
        snapshot.time_ms,
        slots.join("|"),
        snapshot.buffer.occupancy,
        snapshot.buffer.capacity,
        owner,
        actors.join(" ")
    )
}

fn render_event(record: &EventRecord) -> String {
    let text = record.event.describe();
    let text = match &record.event {
        SimEvent::Overwrite { .. } | SimEvent::StaleRead { .. } => text.red().bold(),
        SimEvent::CriticalSectionFailure { .. } | SimEvent::LockMisuse { .. } => text.red(),
        SimEvent::Waiting { .. } | SimEvent::Woken { .. } => text.magenta(),
        _ => text.normal(),
    };
    format!("  {:>8}ms {}", record.time_ms, text)
}

fn print_summary(snapshot: &SimSnapshot, anomalies: &[EventRecord]) {
    let stats = &snapshot.stats;
    println!("{}", "Summary".bold());
    println!("  mode:        {}", snapshot.mode);
    println!("  seed:        {}", snapshot.seed);
    println!("  time:        {}ms", snapshot.time_ms);
    println!("  produced:    {}", stats.produced);
    println!("  consumed:    {}", stats.consumed);
    println!("  waits:       {}", stats.waits);
    println!(
        "  occupancy:   {}/{}",
        snapshot.buffer.occupancy, snapshot.buffer.capacity
    );
    if stats.overwrites > 0 || stats.stale_reads > 0 {
        println!("  overwrites:  {}", stats.overwrites.to_string().red());
        println!("  stale reads: {}", stats.stale_reads.to_string().red());
    }
    if stats.failures > 0 || stats.lock_misuses > 0 {
        println!("  failures:    {}", stats.failures.to_string().red());
        println!("  misuses:     {}", stats.lock_misuses.to_string().red());
    }
    for record in anomalies {
        println!("{}", render_event(record));
    }
}
