//! Shuffle/repeat policy
//!
//! Decides which queue entry plays after (or before) the current one. Owns the
//! play history, the shuffler and the auto-shuffle window so the whole policy
//! state lives in one place.

use crate::auto_shuffle::AutoShuffleWindow;
use crate::config::EngineConfig;
use crate::history::History;
use crate::queue::QueueStore;
use crate::shuffle::Shuffler;
use crate::types::{RepeatMode, ShuffleMode, TrackRef};

/// Outcome of [`Sequencer::next_position`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Index to play next; `None` means stop
    pub position: Option<usize>,

    /// Auto shuffle trimmed or extended the queue while deciding
    pub queue_changed: bool,
}

impl Advance {
    fn stop() -> Self {
        Self {
            position: None,
            queue_changed: false,
        }
    }

    fn to(position: usize) -> Self {
        Self {
            position: Some(position),
            queue_changed: false,
        }
    }
}

/// Next/previous position policy
#[derive(Debug)]
pub struct Sequencer {
    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,
    history: History,
    shuffler: Shuffler,
    auto: AutoShuffleWindow,
}

impl Sequencer {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_shuffler(config, Shuffler::new())
    }

    /// Build with a specific shuffler (seeded in tests)
    pub fn with_shuffler(config: &EngineConfig, shuffler: Shuffler) -> Self {
        Self {
            shuffle_mode: ShuffleMode::None,
            repeat_mode: RepeatMode::None,
            history: History::new(config.history_size),
            shuffler,
            auto: AutoShuffleWindow::new(config.auto_shuffle.clone(), config.history_size),
        }
    }

    /// Position to play after the current entry
    ///
    /// `force` is set for user-initiated skips: it ignores repeat-current and
    /// wraps around even without repeat-all.
    pub fn next_position(&mut self, queue: &mut QueueStore, force: bool) -> Advance {
        let len = queue.len();
        if len == 0 {
            return Advance::stop();
        }
        let current = queue.current_index();

        if self.repeat_mode == RepeatMode::Current && !force {
            return Advance::to(current.unwrap_or(0));
        }

        match self.shuffle_mode {
            ShuffleMode::Normal => {
                if let Some(current) = current {
                    if self.history.peek() != Some(current) {
                        self.history.push(current);
                    }
                }

                let mut unplayed = vec![true; len];
                for index in self.history.iter().filter(|&i| i < len) {
                    unplayed[index] = false;
                }
                let mut candidates: Vec<usize> = (0..len).filter(|&i| unplayed[i]).collect();

                if candidates.is_empty() {
                    if self.repeat_mode == RepeatMode::All || force {
                        candidates = (0..len).collect();
                    } else {
                        return Advance::stop();
                    }
                }

                let skip = self.shuffler.next_int(candidates.len());
                Advance::to(candidates[skip])
            }
            ShuffleMode::Auto => {
                let queue_changed = self.auto.maintain(queue, &mut self.shuffler);
                let position = queue
                    .current_index()
                    .map_or(0, |current| current + 1);
                Advance {
                    position: (position < queue.len()).then_some(position),
                    queue_changed,
                }
            }
            ShuffleMode::None => match current {
                Some(current) if current + 1 >= len => {
                    if self.repeat_mode == RepeatMode::All || force {
                        Advance::to(0)
                    } else {
                        Advance::stop()
                    }
                }
                Some(current) => Advance::to(current + 1),
                None => Advance::to(0),
            },
        }
    }

    /// Position to go back to
    ///
    /// Normal shuffle walks the play history backwards; everything else steps
    /// back one entry, wrapping to the end.
    pub fn previous_position(&mut self, queue: &QueueStore) -> Option<usize> {
        let len = queue.len();
        if len == 0 {
            return None;
        }
        let current = queue.current_index();

        if self.shuffle_mode == ShuffleMode::Normal {
            while let Some(index) = self.history.pop() {
                if Some(index) != current && index < len {
                    return Some(index);
                }
            }
            return None;
        }

        match current {
            Some(current) if current > 0 => Some(current - 1),
            _ => Some(len - 1),
        }
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.shuffle_mode = mode;
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn shuffler_mut(&mut self) -> &mut Shuffler {
        &mut self.shuffler
    }

    pub fn auto_window(&self) -> &AutoShuffleWindow {
        &self.auto
    }

    /// Run window maintenance outside of `next_position`
    pub fn maintain_auto_window(&mut self, queue: &mut QueueStore) -> bool {
        self.auto.maintain(queue, &mut self.shuffler)
    }

    /// Install the auto-shuffle candidate pool; `false` when it is empty
    pub fn set_auto_pool(&mut self, pool: Vec<TrackRef>) -> bool {
        self.auto.set_pool(pool)
    }

    pub fn clear_auto_pool(&mut self) {
        self.auto.clear();
    }
}
