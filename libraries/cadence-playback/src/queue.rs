//! Play queue storage
//!
//! A single ordered queue of [`TrackRef`]s with a cursor on the current entry
//! and the entry prepared to play after it:
//!
//! ```text
//!   0        1        2        3        4
//! [ A ]    [ B ]    [ C ]    [ D ]    [ E ]
//!            ^current          ^next
//! ```
//!
//! Every mutation keeps both cursors pointing at the same tracks they pointed
//! at before, unless that track was itself removed.

use crate::types::TrackRef;

/// Initial capacity of the backing storage
const MIN_CAPACITY: usize = 16;

/// Result of [`QueueStore::remove_range`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedRange {
    /// Number of entries removed
    pub count: usize,

    /// Whether the current entry was inside the removed range
    pub current_removed: bool,
}

/// Ordered play queue with current/next cursors
///
/// Invariant: `current` is `Some(i)` with `i < len()` whenever the queue is
/// non-empty, and `None` when it is empty. `next`, when set, is also in range.
#[derive(Debug, Clone)]
pub struct QueueStore {
    entries: Vec<TrackRef>,
    current: Option<usize>,
    next: Option<usize>,
}

impl QueueStore {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MIN_CAPACITY),
            current: None,
            next: None,
        }
    }

    /// Grow the backing storage to hold at least `needed` entries
    ///
    /// Capacity doubles until it is large enough; it never shrinks.
    pub fn ensure_capacity(&mut self, needed: usize) {
        let capacity = self.entries.capacity();
        if needed <= capacity {
            return;
        }

        let mut target = capacity.max(MIN_CAPACITY);
        while target < needed {
            target *= 2;
        }
        self.entries.reserve_exact(target - self.entries.len());
    }

    /// Replace the whole queue with `tracks`
    ///
    /// The cursor moves to the first entry (or `None` for an empty list).
    pub fn replace(&mut self, tracks: &[TrackRef]) {
        self.entries.clear();
        self.ensure_capacity(tracks.len());
        self.entries.extend_from_slice(tracks);
        self.current = if self.entries.is_empty() { None } else { Some(0) };
        self.next = None;
    }

    /// Insert `tracks` at `position`, clamped to `[0, len]`
    ///
    /// Entries at or after the insertion point shift right. Inserting into an
    /// empty queue puts the cursor on the first entry. Returns the clamped
    /// insertion index.
    pub fn insert_at(&mut self, tracks: &[TrackRef], position: usize) -> usize {
        let position = position.min(self.entries.len());
        let added = tracks.len();
        if added == 0 {
            return position;
        }

        self.ensure_capacity(self.entries.len() + added);
        self.entries
            .splice(position..position, tracks.iter().cloned());

        let shift = |index: usize| if index >= position { index + added } else { index };
        self.current = Some(self.current.map_or(0, shift));
        self.next = self.next.map(shift);

        position
    }

    /// Remove entries `first..=last`, clamped to the queue bounds
    ///
    /// The current cursor is decremented by the removed count when it was
    /// after the range, or moved to `first` when it was inside it (wrapping to
    /// 0 when `first` is past the new end).
    pub fn remove_range(&mut self, first: usize, last: usize) -> RemovedRange {
        if self.entries.is_empty() || last < first || first >= self.entries.len() {
            return RemovedRange::default();
        }

        let last = last.min(self.entries.len() - 1);
        let count = last - first + 1;
        let range = first..=last;

        let mut current_removed = false;
        if let Some(current) = self.current {
            if range.contains(&current) {
                current_removed = true;
                self.current = Some(first);
            } else if current > last {
                self.current = Some(current - count);
            }
        }
        self.next = match self.next {
            Some(next) if range.contains(&next) => None,
            Some(next) if next > last => Some(next - count),
            other => other,
        };

        self.entries.drain(range);

        let len = self.entries.len();
        if len == 0 {
            self.current = None;
            self.next = None;
        } else if self.current.is_some_and(|current| current >= len) {
            self.current = Some(0);
        }

        RemovedRange {
            count,
            current_removed,
        }
    }

    /// Move the entry at `from` to `to`, both clamped to the queue bounds
    ///
    /// Entries in between rotate by one. Cursors follow their tracks.
    pub fn move_item(&mut self, from: usize, to: usize) {
        let Some(max) = self.entries.len().checked_sub(1) else {
            return;
        };
        let from = from.min(max);
        let to = to.min(max);

        if from < to {
            self.entries[from..=to].rotate_left(1);
        } else if to < from {
            self.entries[to..=from].rotate_right(1);
        } else {
            return;
        }

        let follow = |index: usize| moved_index(index, from, to);
        self.current = self.current.map(follow);
        self.next = self.next.map(follow);
    }

    /// Read-only copy of all entries
    pub fn snapshot(&self) -> Vec<TrackRef> {
        self.entries.clone()
    }

    /// All entries in queue order
    pub fn entries(&self) -> &[TrackRef] {
        &self.entries
    }

    /// Whether the queue holds exactly `tracks`, in order
    pub fn matches(&self, tracks: &[TrackRef]) -> bool {
        self.entries == tracks
    }

    /// Index of the first occurrence of `track`
    pub fn position_of(&self, track: &TrackRef) -> Option<usize> {
        self.entries.iter().position(|entry| entry == track)
    }

    /// Get entry at index
    pub fn get(&self, index: usize) -> Option<&TrackRef> {
        self.entries.get(index)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current allocated capacity
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Index of the current entry
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Current entry
    pub fn current(&self) -> Option<&TrackRef> {
        self.current.and_then(|index| self.entries.get(index))
    }

    /// Move the cursor; out-of-range indices are rejected
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.current = Some(index);
            true
        } else {
            false
        }
    }

    /// Index of the entry prepared to play after the current one
    pub fn next_index(&self) -> Option<usize> {
        self.next
    }

    /// Record the next index; out-of-range indices clear it
    pub fn set_next_index(&mut self, index: Option<usize>) {
        self.next = index.filter(|&i| i < self.entries.len());
    }

    /// Clear entire queue
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
        self.next = None;
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Where `index` ends up after moving the entry at `from` to `to`
fn moved_index(index: usize, from: usize, to: usize) -> usize {
    if index == from {
        to
    } else if from < to && (from..=to).contains(&index) {
        index - 1
    } else if to < from && (to..=from).contains(&index) {
        index + 1
    } else {
        index
    }
}
