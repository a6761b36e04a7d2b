//! Core types for the playback engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimal reference to a playable item
///
/// Identifies a track by its external id and the host (collection/provider)
/// it lives in. Two references are equal when both id and host match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    /// External identifier inside the host
    pub id: String,

    /// Host tag, e.g. `content://media/external/audio/media` or a library root
    pub host: String,
}

impl TrackRef {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
        }
    }

    /// URI handed to the source opener: `<host>/<id>`
    pub fn uri(&self) -> String {
        if self.host.is_empty() {
            return self.id.clone();
        }
        format!("{}/{}", self.host.trim_end_matches('/'), self.id)
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host)
    }
}

/// Descriptive metadata reported by a prepared player handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShuffleMode {
    /// Play the queue in order
    #[default]
    None,

    /// Pick randomly among entries not played recently
    Normal,

    /// Party shuffle: keep extending the queue with random tracks from the catalog
    Auto,
}

impl ShuffleMode {
    /// Integer representation used by the persisted snapshot
    pub fn as_i32(self) -> i32 {
        match self {
            ShuffleMode::None => 0,
            ShuffleMode::Normal => 1,
            ShuffleMode::Auto => 2,
        }
    }

    /// Unknown values map to `None`
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ShuffleMode::Normal,
            2 => ShuffleMode::Auto,
            _ => ShuffleMode::None,
        }
    }
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    /// Stop when the queue ends
    #[default]
    None,

    /// Loop the current track
    Current,

    /// Wrap around to the start of the queue
    All,
}

impl RepeatMode {
    /// Integer representation used by the persisted snapshot
    pub fn as_i32(self) -> i32 {
        match self {
            RepeatMode::None => 0,
            RepeatMode::Current => 1,
            RepeatMode::All => 2,
        }
    }

    /// Unknown values map to `None`
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => RepeatMode::Current,
            2 => RepeatMode::All,
            _ => RepeatMode::None,
        }
    }
}

/// Where `enqueue` places new tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueueAction {
    /// Append and start playing the first appended track
    Now,

    /// Insert right after the current track
    Next,

    /// Append to the end of the queue
    Last,
}

/// Snapshot of what is playing, attached to every change notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    /// Current queue entry, if any
    pub track: Option<TrackRef>,

    /// Metadata of the prepared source
    pub metadata: TrackMetadata,

    /// Whether the engine is supposed to be playing
    pub is_playing: bool,
}

impl NowPlaying {
    pub fn id(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.id.as_str())
    }

    pub fn host(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.host.as_str())
    }
}
