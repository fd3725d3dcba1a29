//! Bounded Reading History
//!
//! A fixed-capacity FIFO buffer over the most recent readings. Appending
//! to a full buffer evicts the oldest entry, so the buffer always holds a
//! contiguous suffix of all-time arrivals in arrival order.
//!
//! The buffer itself is a plain data structure with no interior locking;
//! the broadcast bridge owns the single instance behind a lock and hands
//! out owned snapshots, never a live reference.

use std::collections::VecDeque;

use crate::domain::reading::Reading;

/// Fixed-capacity, oldest-evicting sequence of readings.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is clamped to one so
    /// that `latest` can always reflect the last append.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest entry when at capacity.
    pub fn append(&mut self, reading: Reading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// The most recently appended reading, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// An independent copy of the current contents, oldest-first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }

    /// Number of readings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the buffer holds no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
