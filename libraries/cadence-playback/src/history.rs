//! Bounded log of previously played queue indices
//!
//! Backs "previous" navigation in shuffle mode and the avoidance set used
//! when picking unplayed entries.

use std::collections::VecDeque;

/// Capped FIFO of queue indices (most recent = back)
///
/// When a push would exceed the cap, the oldest half is dropped in one go.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<usize>,
    max_size: usize,
}

impl History {
    /// Create new history with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size: max_size.max(2),
        }
    }

    /// Record an index
    pub fn push(&mut self, index: usize) {
        self.entries.push_back(index);
        if self.entries.len() > self.max_size {
            let evict = self.max_size / 2;
            self.entries.drain(..evict);
        }
    }

    /// Most recent index (without removing)
    pub fn peek(&self) -> Option<usize> {
        self.entries.back().copied()
    }

    /// Pop most recent index
    pub fn pop(&mut self) -> Option<usize> {
        self.entries.pop_back()
    }

    /// Whether `index` is anywhere in the history
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains(&index)
    }

    /// Whether `index` occurs among the `lookback` most recent entries
    pub fn was_recently_used(&self, index: usize, lookback: usize) -> bool {
        self.entries.iter().rev().take(lookback).any(|&i| i == index)
    }

    /// Indices, oldest first
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().copied()
    }

    /// Replace the contents, keeping only the most recent `max_size` entries
    pub fn restore(&mut self, indices: &[usize]) {
        self.entries.clear();
        let skip = indices.len().saturating_sub(self.max_size);
        self.entries.extend(indices.iter().skip(skip).copied());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
