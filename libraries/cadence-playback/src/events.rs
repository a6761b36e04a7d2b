//! Engine notifications and host collaborators
//!
//! Every state change is published to a [`ChangeNotifier`] after it has been
//! applied and persisted, in event-loop order. The host also provides the
//! auto-shuffle catalog and, on platforms that need one, a wake lock.

use crate::types::{NowPlaying, TrackRef};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Change {
    /// Entries added, removed or reordered
    QueueChanged,
    /// The current track changed
    MetaChanged,
    PlayStateChanged,
    /// Seek; never persisted
    PositionChanged,
    RepeatModeChanged,
    ShuffleModeChanged,
}

impl Change {
    /// Broadcast-style name of the change
    pub fn name(self) -> &'static str {
        match self {
            Change::QueueChanged => "QUEUE_CHANGED",
            Change::MetaChanged => "META_CHANGED",
            Change::PlayStateChanged => "PLAYSTATE_CHANGED",
            Change::PositionChanged => "POSITION_CHANGED",
            Change::RepeatModeChanged => "REPEATMODE_CHANGED",
            Change::ShuffleModeChanged => "SHUFFLEMODE_CHANGED",
        }
    }
}

/// Events published by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A state change together with what is playing afterwards
    Changed {
        change: Change,
        now_playing: NowPlaying,
    },

    /// Too many consecutive sources failed to open; playback halted
    PlaybackFailed {
        /// Entry that was being opened last
        track: Option<TrackRef>,
    },

    /// Idle timer fired with nothing playing and no client attached
    Idle,
}

/// Fire-and-forget sink for [`EngineEvent`]s
pub trait ChangeNotifier: Send {
    fn publish(&self, event: EngineEvent);
}

impl ChangeNotifier for Sender<EngineEvent> {
    fn publish(&self, event: EngineEvent) {
        // Nobody listening is fine
        let _ = self.send(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn publish(&self, _event: EngineEvent) {}
}

/// Source of the auto-shuffle candidate pool
pub trait TrackCatalog: Send {
    /// Every track eligible for party shuffle
    fn all_tracks(&self) -> Vec<TrackRef>;
}

impl TrackCatalog for Vec<TrackRef> {
    fn all_tracks(&self) -> Vec<TrackRef> {
        self.clone()
    }
}

/// Keeps the device awake while a track transition is handled
pub trait WakeLock: Send {
    /// Acquire, releasing automatically after `timeout` at the latest
    fn acquire(&mut self, timeout: Duration);

    fn release(&mut self);
}

/// Wake lock for hosts that never sleep
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWakeLock;

impl WakeLock for NoWakeLock {
    fn acquire(&mut self, _timeout: Duration) {}

    fn release(&mut self) {}
}
