//! Random index generation for shuffle playback
//!
//! [`Shuffler::next_int`] picks uniformly among the values of an interval that
//! were neither returned last time nor are in the recent window. When the
//! window covers the whole interval, only the immediate repeat is excluded,
//! so every call terminates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};

/// Size of the recent window; exceeding it evicts half
const RECENT_CAP: usize = 100;

/// Biased random index generator
#[derive(Debug)]
pub struct Shuffler {
    rng: StdRng,
    previous: Option<usize>,
    recent: VecDeque<usize>,
    recent_set: HashSet<usize>,
}

impl Shuffler {
    /// Create a shuffler seeded from the OS
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a deterministic shuffler
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            previous: None,
            recent: VecDeque::with_capacity(RECENT_CAP),
            recent_set: HashSet::with_capacity(RECENT_CAP),
        }
    }

    /// Return a value in `[0, interval)`
    ///
    /// For `interval > 1` the result never equals the previous result.
    /// `interval == 0` is treated as 1.
    pub fn next_int(&mut self, interval: usize) -> usize {
        let value = if interval <= 1 {
            0
        } else {
            self.pick(interval)
        };
        self.record(value);
        value
    }

    fn pick(&mut self, interval: usize) -> usize {
        let previous = self.previous;
        let fresh: Vec<usize> = (0..interval)
            .filter(|v| Some(*v) != previous && !self.recent_set.contains(v))
            .collect();

        if !fresh.is_empty() {
            return fresh[self.rng.gen_range(0..fresh.len())];
        }

        // Every candidate is recent; only the immediate repeat stays excluded
        match previous.filter(|&p| p < interval) {
            Some(p) => {
                let v = self.rng.gen_range(0..interval - 1);
                if v >= p {
                    v + 1
                } else {
                    v
                }
            }
            None => self.rng.gen_range(0..interval),
        }
    }

    fn record(&mut self, value: usize) {
        self.previous = Some(value);
        self.recent.push_back(value);
        self.recent_set.insert(value);

        if self.recent.len() > RECENT_CAP {
            self.recent.drain(..RECENT_CAP / 2);
            self.recent_set = self.recent.iter().copied().collect();
        }
    }

    /// Forget the previous value and the recent window
    pub fn reset(&mut self) {
        self.previous = None;
        self.recent.clear();
        self.recent_set.clear();
    }

    /// Number of values in the recent window
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }
}

impl Default for Shuffler {
    fn default() -> Self {
        Self::new()
    }
}
