//! Actor identity
//!
//! Display format: `P0`, `P1`, ... for producers and `C0`, `C1`, ... for consumers.

use serde::{Deserialize, Serialize};

/// Which side of the buffer an actor works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    /// Single-letter prefix used in actor ids
    pub fn prefix(&self) -> char {
        match self {
            Self::Producer => 'P',
            Self::Consumer => 'C',
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// Identity of a single actor: its role plus a zero-based index within that role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    pub role: Role,
    pub index: usize,
}

impl ActorId {
    pub fn producer(index: usize) -> Self {
        Self {
            role: Role::Producer,
            index,
        }
    }

    pub fn consumer(index: usize) -> Self {
        Self {
            role: Role::Consumer,
            index,
        }
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.index)
    }
}

impl std::str::FromStr for ActorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let role = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('P') => Role::Producer,
            Some('C') => Role::Consumer,
            _ => return Err(format!("Unknown actor id: {}. Use P<n> or C<n>", s)),
        };
        let index = chars
            .as_str()
            .parse::<usize>()
            .map_err(|_| format!("Unknown actor id: {}. Use P<n> or C<n>", s))?;
        Ok(Self { role, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_display() {
        assert_eq!(ActorId::producer(0).to_string(), "P0");
        assert_eq!(ActorId::consumer(12).to_string(), "C12");
    }

    #[test]
    fn test_actor_id_parse() {
        assert_eq!("P3".parse::<ActorId>().unwrap(), ActorId::producer(3));
        assert_eq!("c1".parse::<ActorId>().unwrap(), ActorId::consumer(1));
        assert!("X1".parse::<ActorId>().is_err());
        assert!("P".parse::<ActorId>().is_err());
        assert!("Pone".parse::<ActorId>().is_err());
    }

    #[test]
    fn test_actor_id_ordering() {
        // Producers sort before consumers, then by index
        let mut ids = vec![ActorId::consumer(0), ActorId::producer(1), ActorId::producer(0)];
        ids.sort();
        assert_eq!(ids, vec![ActorId::producer(0), ActorId::producer(1), ActorId::consumer(0)]);
    }
}
