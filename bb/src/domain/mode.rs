//! Synchronization mode selector

use serde::{Deserialize, Serialize};

/// Whether actors coordinate through the mutex or hit the buffer directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Synchronized,
    Unsynchronized,
}

impl SyncMode {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, Self::Synchronized)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synchronized => write!(f, "synchronized"),
            Self::Unsynchronized => write!(f, "unsynchronized"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" | "synchronized" => Ok(Self::Synchronized),
            "unsync" | "unsynchronized" => Ok(Self::Unsynchronized),
            _ => Err(format!("Unknown mode: {}. Use: sync or unsync", s)),
        }
    }
}
