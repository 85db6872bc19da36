use core::iter::FusedIterator;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{CAPACITY, Reading};

/// Fixed-capacity ring of readings, oldest first
///
/// The logical sequence is `slots[(start + i) % CAPACITY]` for
/// `i in 0..len`. A push on a full ring evicts the oldest reading; a new
/// sample is never dropped.
///
/// ## Memory Usage
///
/// 24 slots × 24 bytes plus two indices, small enough for RTC fast memory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadingStore {
    start: usize,
    len: usize,
    slots: [Reading; CAPACITY],
}

impl ReadingStore {
    pub const fn new() -> Self {
        Self {
            start: 0,
            len: 0,
            slots: [Reading::ZERO; CAPACITY],
        }
    }

    /// Append `reading` at the logical end, evicting the oldest when full.
    pub fn push(&mut self, reading: Reading) {
        // Drop the oldest before writing, so an interrupted push leaves a
        // valid ring behind.
        if self.len == CAPACITY {
            warn!(
                "Reading store full, evicting reading from {}",
                self.slots[self.start].timestamp
            );
            self.start = (self.start + 1) % CAPACITY;
            self.len -= 1;
        }

        let end = (self.start + self.len) % CAPACITY;
        self.slots[end] = reading;
        self.len += 1;

        debug!("Stored {} ({}/{})", reading, self.len, CAPACITY);
    }

    /// Iterate the buffered readings from oldest to newest.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            store: self,
            front: 0,
            back: self.len,
        }
    }

    /// Drop every buffered reading. Only call after a confirmed upload.
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }

    /// Whether enough readings are buffered to attempt an upload
    pub const fn needs_upload(&self, threshold: usize) -> bool {
        self.len >= threshold
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.len == CAPACITY
    }

    /// The most recently pushed reading
    pub fn latest(&self) -> Option<&Reading> {
        self.len
            .checked_sub(1)
            .map(|last| &self.slots[(self.start + last) % CAPACITY])
    }

    /// Indices are within bounds. Memory that was never initialized may
    /// fail this.
    pub const fn is_consistent(&self) -> bool {
        self.start < CAPACITY && self.len <= CAPACITY
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a ReadingStore {
    type Item = &'a Reading;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing cursor over a [`ReadingStore`]
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    store: &'a ReadingStore,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Reading;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let slot = (self.store.start + self.front) % CAPACITY;
        self.front += 1;
        Some(&self.store.slots[slot])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(&self.store.slots[(self.store.start + self.back) % CAPACITY])
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_SYNC_SAMPLES;

    fn reading(timestamp: u64) -> Reading {
        Reading::new(timestamp, 50.0, 21.5, 3.9)
    }

    fn timestamps(store: &ReadingStore) -> Vec<u64> {
        store.iter().map(|r| r.timestamp).collect()
    }

    #[test]
    fn new_store_is_empty() {
        let store = ReadingStore::new();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
        assert!(store.latest().is_none());
    }

    #[test]
    fn push_keeps_chronological_order() {
        let mut store = ReadingStore::new();
        for ts in 1..=5 {
            store.push(reading(ts));
        }

        assert_eq!(store.len(), 5);
        assert_eq!(timestamps(&store), [1, 2, 3, 4, 5]);
        assert_eq!(store.latest().map(|r| r.timestamp), Some(5));
    }

    #[test]
    fn overflow_evicts_oldest_only() {
        let mut store = ReadingStore::new();
        for ts in 1..=CAPACITY as u64 {
            store.push(reading(ts));
        }
        assert!(store.is_full());

        store.push(reading(CAPACITY as u64 + 1));

        assert_eq!(store.len(), CAPACITY);
        let kept = timestamps(&store);
        assert_eq!(kept.first(), Some(&2), "first reading evicted");
        assert_eq!(kept.last(), Some(&(CAPACITY as u64 + 1)), "newest retained");
    }

    #[test]
    fn long_runs_retain_the_most_recent_window() {
        for total in [CAPACITY + 1, 2 * CAPACITY, 3 * CAPACITY + 7, 100] {
            let mut store = ReadingStore::new();
            for ts in 0..total as u64 {
                store.push(reading(ts));
            }

            let expected: Vec<u64> = ((total - CAPACITY) as u64..total as u64).collect();
            assert_eq!(timestamps(&store), expected, "after {total} pushes");
            assert!(store.is_consistent());
        }
    }

    #[test]
    fn iteration_is_restartable_and_does_not_mutate() {
        let mut store = ReadingStore::new();
        for ts in 0..30 {
            store.push(reading(ts));
        }
        let before = store.clone();

        let first = timestamps(&store);
        let second = timestamps(&store);

        assert_eq!(first, second);
        assert_eq!(store, before);
        assert_eq!(store.iter().len(), CAPACITY);
        assert_eq!(store.iter().rev().next().map(|r| r.timestamp), Some(29));
    }

    #[test]
    fn needs_upload_tracks_threshold() {
        let mut store = ReadingStore::new();
        for len in 0..=CAPACITY {
            assert_eq!(store.len(), len);
            assert_eq!(store.needs_upload(MIN_SYNC_SAMPLES), len >= MIN_SYNC_SAMPLES);
            store.push(reading(len as u64));
        }
    }

    #[test]
    fn clear_empties_the_ring() {
        let mut store = ReadingStore::new();
        for ts in 0..30 {
            store.push(reading(ts));
        }

        store.clear();

        assert!(store.is_empty());
        assert!(!store.needs_upload(MIN_SYNC_SAMPLES));
        store.push(reading(99));
        assert_eq!(timestamps(&store), [99]);
    }
}
