//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::SimConfig;
use crate::domain::{ActorId, SyncMode};

/// boundbuf - Bounded-Buffer Producer/Consumer Simulator
#[derive(Parser)]
#[command(
    name = "bb",
    about = "Bounded-buffer producer/consumer simulator with race injection",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run in virtual time and print a summary
    Run {
        #[command(flatten)]
        sim: SimArgs,

        /// Virtual time to simulate
        #[arg(short, long, default_value = "30000")]
        duration_ms: u64,

        /// Print a snapshot every N virtual milliseconds (0 = summary only)
        #[arg(short, long, default_value = "0")]
        every_ms: u64,

        /// Fail the next critical section of an actor (e.g. P0, C1)
        #[arg(long = "fault", value_name = "ACTOR")]
        faults: Vec<ActorId>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run against the wall clock, printing a line per step
    Watch {
        #[command(flatten)]
        sim: SimArgs,

        /// Wall-clock milliseconds between steps
        #[arg(short, long, default_value = "250")]
        tick_ms: u64,

        /// Virtual milliseconds advanced per step
        #[arg(short, long, default_value = "250")]
        step_ms: u64,

        /// Stop after this much virtual time (0 = until Ctrl+C)
        #[arg(short, long, default_value = "0")]
        duration_ms: u64,
    },

    /// Demonstrate race conditions without synchronization
    Race {
        /// Number of producers writing into a single slot
        #[arg(short, long, default_value = "2")]
        producers: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        sim: SimArgs,
    },
}

/// Overrides applied on top of the loaded configuration
#[derive(Debug, Clone, Default, Args)]
pub struct SimArgs {
    /// Number of producers
    #[arg(short = 'P', long)]
    pub producers: Option<usize>,

    /// Number of consumers
    #[arg(short = 'C', long)]
    pub consumers: Option<usize>,

    /// Buffer capacity
    #[arg(short = 'n', long)]
    pub capacity: Option<usize>,

    /// Execution mode (sync, unsync)
    #[arg(short, long)]
    pub mode: Option<SyncMode>,

    /// Transfer speed multiplier
    #[arg(long)]
    pub speed: Option<f64>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SimArgs {
    /// Apply every given override, then clamp the result into range
    pub fn apply(&self, mut config: SimConfig) -> SimConfig {
        debug!(?self, "SimArgs::apply: called");
        if let Some(producers) = self.producers {
            config.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            config.consumers = consumers;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(speed) = self.speed {
            config.transfer_speed = speed;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.clamped()
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boundbuf")
        .join("logs")
        .join("boundbuf.log")
}

/// Output format for run/race reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
