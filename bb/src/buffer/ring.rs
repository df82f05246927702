//! Ring storage with write/read cursors

use serde::Serialize;
use tracing::debug;

use crate::domain::Item;

/// Result of storing an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Slot the item landed in
    pub slot: usize,
    /// Unread item that was clobbered (race injection only)
    pub overwritten: Option<Item>,
}

/// Result of taking an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Slot that was read
    pub slot: usize,
    /// `None` means the slot was already empty: a stale read
    pub item: Option<Item>,
}

impl ReadOutcome {
    pub fn is_stale(&self) -> bool {
        self.item.is_none()
    }
}

/// Read-only view of the buffer for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferSnapshot {
    pub capacity: usize,
    pub slots: Vec<Option<Item>>,
    /// Occupancy counter. Can leave `0..=capacity` only in unsynchronized mode.
    pub occupancy: i64,
    #[serde(rename = "write-index")]
    pub write_index: usize,
    #[serde(rename = "read-index")]
    pub read_index: usize,
}

impl BufferSnapshot {
    /// Slots actually holding an item, independent of the counter
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Fixed-capacity ring of provenance-tagged slots
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    slots: Vec<Option<Item>>,
    write_index: usize,
    read_index: usize,
    /// Signed so unsynchronized drift below zero stays observable
    occupancy: i64,
}

impl CircularBuffer {
    /// Create an empty buffer. A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "CircularBuffer::new: called");
        Self {
            slots: vec![None; capacity.max(1)],
            write_index: 0,
            read_index: 0,
            occupancy: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupancy(&self) -> i64 {
        self.occupancy
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy <= 0
    }

    /// Store at the write cursor without any capacity check
    pub fn write(&mut self, item: Item) -> WriteOutcome {
        let slot = self.write_index;
        let overwritten = self.slots[slot].replace(item);
        self.write_index = (self.write_index + 1) % self.capacity();
        self.occupancy += 1;
        debug!(slot, %item, overwrote = ?overwritten, occupancy = self.occupancy, "CircularBuffer::write: stored");
        WriteOutcome { slot, overwritten }
    }

    /// Take from the read cursor without any emptiness check
    pub fn read(&mut self) -> ReadOutcome {
        let slot = self.read_index;
        let item = self.slots[slot].take();
        self.read_index = (self.read_index + 1) % self.capacity();
        self.occupancy -= 1;
        debug!(slot, item = ?item, occupancy = self.occupancy, "CircularBuffer::read: taken");
        ReadOutcome { slot, item }
    }

    /// Store only if a slot is free
    pub fn try_write(&mut self, item: Item) -> Option<WriteOutcome> {
        if self.is_full() {
            debug!(%item, "CircularBuffer::try_write: full, refusing");
            return None;
        }
        Some(self.write(item))
    }

    /// Take only if an item is present
    pub fn try_read(&mut self) -> Option<ReadOutcome> {
        if self.is_empty() {
            debug!("CircularBuffer::try_read: empty, refusing");
            return None;
        }
        Some(self.read())
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            capacity: self.capacity(),
            slots: self.slots.clone(),
            occupancy: self.occupancy,
            write_index: self.write_index,
            read_index: self.read_index,
        }
    }
}
