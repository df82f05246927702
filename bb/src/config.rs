//! Simulator configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::{Role, SyncMode};
use crate::error::SimError;

/// Project-local config file, looked up in the working directory
const LOCAL_CONFIG: &str = ".boundbuf.yml";

/// Lowest base delay between ticks of one actor
pub const MIN_DELAY_MS: u64 = 100;

/// Highest base delay between ticks of one actor
pub const MAX_DELAY_MS: u64 = 10_000;

/// Most actors allowed per role
pub const MAX_ACTORS: usize = 16;

/// Largest buffer capacity
pub const MAX_CAPACITY: usize = 64;

/// Transfer-speed multiplier bounds
pub const MIN_TRANSFER_SPEED: f64 = 0.1;
pub const MAX_TRANSFER_SPEED: f64 = 10.0;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of producer actors
    pub producers: usize,

    /// Number of consumer actors
    pub consumers: usize,

    /// Buffer capacity (slots)
    pub capacity: usize,

    /// Base delay between producer ticks
    #[serde(rename = "producer-delay-ms")]
    pub producer_delay_ms: u64,

    /// Base delay between consumer ticks
    #[serde(rename = "consumer-delay-ms")]
    pub consumer_delay_ms: u64,

    /// Synchronized or race-injected execution
    pub mode: SyncMode,

    /// Multiplier applied to transfer duration (2.0 = twice as fast)
    #[serde(rename = "transfer-speed")]
    pub transfer_speed: f64,

    /// Transfer duration at speed 1.0; 0 commits immediately
    #[serde(rename = "transfer-ms")]
    pub transfer_ms: u64,

    /// Upper bound of the per-tick random extra delay
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,

    /// Initial stagger bound as a fraction of the base delay
    #[serde(rename = "stagger-fraction")]
    pub stagger_fraction: f64,

    /// RNG seed; random when unset
    pub seed: Option<u64>,

    /// Events kept in the observability log
    #[serde(rename = "event-log-capacity")]
    pub event_log_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            capacity: 5,
            producer_delay_ms: 1500,
            consumer_delay_ms: 2000,
            mode: SyncMode::Synchronized,
            transfer_speed: 1.0,
            transfer_ms: 600,
            jitter_ms: 200,
            stagger_fraction: 0.5,
            seed: None,
            event_log_capacity: 200,
        }
    }
}

fn clamp_field<T>(errors: &mut Vec<SimError>, field: &str, value: T, clamped: T) -> T
where
    T: PartialEq + std::fmt::Display + Copy,
{
    if value != clamped {
        errors.push(SimError::InvalidConfiguration {
            field: field.to_string(),
            value: value.to_string(),
            clamped: clamped.to_string(),
        });
    }
    clamped
}

impl SimConfig {
    /// Base tick delay for a role
    pub fn delay_for(&self, role: Role) -> u64 {
        match role {
            Role::Producer => self.producer_delay_ms,
            Role::Consumer => self.consumer_delay_ms,
        }
    }

    /// Transfer duration after applying the speed multiplier
    pub fn effective_transfer_ms(&self) -> u64 {
        if !self.transfer_speed.is_finite() || self.transfer_speed <= 0.0 {
            return self.transfer_ms;
        }
        (self.transfer_ms as f64 / self.transfer_speed).round() as u64
    }

    /// Clamp every out-of-range field, returning the fixed config and one
    /// `InvalidConfiguration` per field that moved
    pub fn clamp(&self) -> (Self, Vec<SimError>) {
        let mut errors = Vec::new();
        let speed = if self.transfer_speed.is_finite() {
            self.transfer_speed.clamp(MIN_TRANSFER_SPEED, MAX_TRANSFER_SPEED)
        } else {
            1.0
        };
        let stagger = if self.stagger_fraction.is_finite() {
            self.stagger_fraction.clamp(0.0, 1.0)
        } else {
            0.5
        };

        let config = Self {
            producers: clamp_field(&mut errors, "producers", self.producers, self.producers.clamp(1, MAX_ACTORS)),
            consumers: clamp_field(&mut errors, "consumers", self.consumers, self.consumers.clamp(1, MAX_ACTORS)),
            capacity: clamp_field(&mut errors, "capacity", self.capacity, self.capacity.clamp(1, MAX_CAPACITY)),
            producer_delay_ms: clamp_field(
                &mut errors,
                "producer-delay-ms",
                self.producer_delay_ms,
                self.producer_delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS),
            ),
            consumer_delay_ms: clamp_field(
                &mut errors,
                "consumer-delay-ms",
                self.consumer_delay_ms,
                self.consumer_delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS),
            ),
            mode: self.mode,
            transfer_speed: clamp_field(&mut errors, "transfer-speed", self.transfer_speed, speed),
            transfer_ms: clamp_field(
                &mut errors,
                "transfer-ms",
                self.transfer_ms,
                self.transfer_ms.min(MAX_DELAY_MS),
            ),
            jitter_ms: clamp_field(&mut errors, "jitter-ms", self.jitter_ms, self.jitter_ms.min(MAX_DELAY_MS)),
            stagger_fraction: clamp_field(&mut errors, "stagger-fraction", self.stagger_fraction, stagger),
            seed: self.seed,
            event_log_capacity: clamp_field(
                &mut errors,
                "event-log-capacity",
                self.event_log_capacity,
                self.event_log_capacity.max(1),
            ),
        };
        (config, errors)
    }

    /// Report out-of-range fields without changing anything
    pub fn validate(&self) -> Vec<SimError> {
        self.clamp().1
    }

    /// Clamp out-of-range fields to the nearest valid bound, logging each one
    pub fn clamped(&self) -> Self {
        let (config, errors) = self.clamp();
        for err in &errors {
            warn!("{}", err);
        }
        config
    }

    /// Config files tried when no explicit path is given, in order
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("boundbuf").join("boundbuf.yml"));
        }
        paths
    }

    /// Load and clamp the first usable configuration
    ///
    /// An explicit path must load. Otherwise the search paths are tried in
    /// order, skipping files that fail to parse, and defaults come last.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "SimConfig::load: called");
        if let Some(path) = config_path {
            let config =
                Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok(config.clamped());
        }

        let found = Self::search_paths()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable config");
                    None
                }
            });

        match found {
            Some(config) => Ok(config.clamped()),
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}
