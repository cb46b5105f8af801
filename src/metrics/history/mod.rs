mod circular_buffer;

pub use circular_buffer::CircularBuffer;

use chrono::{DateTime, Local};

/// A history sample and the moment it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub timestamp: DateTime<Local>,
    pub sample: T,
}

/// Bounded, chronologically ordered series of timestamped samples.
///
/// Storing timestamp and sample together keeps every derived series
/// index-aligned with the timestamps.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: CircularBuffer<Entry<T>>,
}

impl<T> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: CircularBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, sample: T) {
        self.push_at(Local::now(), sample);
    }

    pub fn push_at(&mut self, timestamp: DateTime<Local>, sample: T) {
        self.entries.push(Entry { timestamp, sample });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Entry<T>> {
        self.entries.last()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Local>> {
        self.iter().map(|e| e.timestamp).collect()
    }

    /// Projects one series out of the buffered samples.
    pub fn series<U>(&self, f: impl Fn(&T) -> U) -> Vec<U> {
        self.iter().map(|e| f(&e.sample)).collect()
    }

    pub fn to_vec(&self) -> Vec<Entry<T>>
    where
        T: Clone,
    {
        self.entries.as_vec()
    }
}
