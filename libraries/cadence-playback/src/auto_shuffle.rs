//! Party shuffle: a rolling window over a catalog-wide candidate pool
//!
//! While auto shuffle is active the queue never holds more than a handful of
//! already played entries before the current one, and is topped up with
//! random picks from the pool so a few entries always follow it.

use crate::config::AutoShuffleConfig;
use crate::history::History;
use crate::queue::QueueStore;
use crate::shuffle::Shuffler;
use crate::types::TrackRef;
use tracing::debug;

/// Rolling auto-shuffle window
#[derive(Debug)]
pub struct AutoShuffleWindow {
    /// Every eligible track, captured when auto shuffle was enabled
    pool: Vec<TrackRef>,

    /// Pool indices picked so far (most recent = back)
    picks: History,

    config: AutoShuffleConfig,
}

impl AutoShuffleWindow {
    pub fn new(config: AutoShuffleConfig, history_size: usize) -> Self {
        Self {
            pool: Vec::new(),
            picks: History::new(history_size),
            config,
        }
    }

    /// Install a fresh candidate pool and forget earlier picks
    ///
    /// Returns `false` when the pool is empty.
    pub fn set_pool(&mut self, pool: Vec<TrackRef>) -> bool {
        self.pool = pool;
        self.picks.clear();
        !self.pool.is_empty()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.picks.clear();
    }

    /// Trim played entries and top up the tail
    ///
    /// Returns whether the queue changed.
    pub fn maintain(&mut self, queue: &mut QueueStore, shuffler: &mut Shuffler) -> bool {
        let mut changed = false;

        if let Some(current) = queue.current_index() {
            if current > self.config.trim_threshold {
                let last = current - self.config.keep_played - 1;
                let removed = queue.remove_range(0, last);
                debug!("Auto shuffle trimmed {} played entries", removed.count);
                changed = true;
            }
        }

        if self.pool.is_empty() {
            return changed;
        }

        while self.upcoming(queue) < self.config.lookahead {
            let index = self.pick(shuffler);
            let track = self.pool[index].clone();
            queue.insert_at(std::slice::from_ref(&track), queue.len());
            self.picks.push(index);
            changed = true;
        }

        changed
    }

    /// Entries after the current one (all of them when there is no current)
    fn upcoming(&self, queue: &QueueStore) -> usize {
        match queue.current_index() {
            Some(current) => queue.len() - current - 1,
            None => queue.len(),
        }
    }

    /// Draw a pool index not picked recently; the lookback halves on each
    /// rejection, so a lookback of zero always accepts.
    fn pick(&self, shuffler: &mut Shuffler) -> usize {
        let mut lookback = self.picks.len();
        loop {
            let index = shuffler.next_int(self.pool.len());
            if !self.picks.was_recently_used(index, lookback) {
                return index;
            }
            lookback /= 2;
        }
    }
}
