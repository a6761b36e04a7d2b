//! Delayed messages for the event loop

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Kinds of delayed work; at most one of each is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    FadeDown,
    FadeUp,
    ServerDied,
    ReleaseWakeLock,
    Idle,
}

#[derive(Debug, Default)]
pub(crate) struct Timers {
    deadlines: HashMap<TimerKind, Instant>,
}

impl Timers {
    /// Schedule `kind` after `delay`, replacing a pending one
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.deadlines.insert(kind, Instant::now() + delay);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines.remove(&kind);
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&kind, &deadline)| (deadline, kind))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
