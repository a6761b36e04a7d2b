//! Platform player abstraction
//!
//! The engine never decodes audio itself. A platform supplies a
//! [`SourceOpener`] that loads and prepares a URI into an opaque
//! [`PlayerHandle`]; the handle reports completion and errors back through the
//! [`PlayerEvents`] sink it was opened with.

use crate::engine::Message;
use crate::error::OpenError;
use crate::types::TrackMetadata;
use crossbeam_channel::Sender;
use std::fmt;
use std::time::Duration;

/// Identity of an opened handle
///
/// Signals carrying the id of a handle that was already released are
/// ignored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous errors reported by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerErrorKind {
    /// The media server behind the handle is gone; the handle is unusable
    ServerDied,

    /// Any other platform error code
    Other(i32),
}

/// Signal from a handle to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayerSignal {
    Completed,
    Error(PlayerErrorKind),
}

/// Callback sink handed to [`SourceOpener::open`]
///
/// Cheap to clone; may be used from any thread. Signals sent after the engine
/// shut down are dropped.
#[derive(Debug, Clone)]
pub struct PlayerEvents {
    id: HandleId,
    tx: Sender<Message>,
}

impl PlayerEvents {
    pub(crate) fn new(id: HandleId, tx: Sender<Message>) -> Self {
        Self { id, tx }
    }

    /// Id of the handle these events belong to
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Playback reached the end of the source
    pub fn completed(&self) {
        self.send(PlayerSignal::Completed);
    }

    /// The player failed
    pub fn error(&self, kind: PlayerErrorKind) {
        self.send(PlayerSignal::Error(kind));
    }

    fn send(&self, signal: PlayerSignal) {
        // A closed channel means the engine is gone; nothing left to notify
        let _ = self.tx.send(Message::Player {
            id: self.id,
            signal,
        });
    }
}

/// A loaded and prepared platform player
pub trait PlayerHandle: Send {
    fn start(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Seek and return the position actually reached
    fn seek(&mut self, position: Duration) -> Duration;

    fn position(&self) -> Duration;

    fn duration(&self) -> Duration;

    /// Whether audio is currently being produced
    fn is_playing(&self) -> bool;

    /// Linear volume in `[0.0, 1.0]`
    fn set_volume(&mut self, volume: f32);

    /// Register the handle to start automatically when this one completes
    ///
    /// `None` clears any registration.
    fn set_next(&mut self, next: Option<&mut dyn PlayerHandle>) -> Result<(), OpenError>;

    /// Free platform resources; the handle is not used afterwards
    fn release(&mut self);

    fn metadata(&self) -> TrackMetadata {
        TrackMetadata::default()
    }
}

/// Loads a URI into a prepared [`PlayerHandle`]
///
/// `open` may block; the engine runs it on a dedicated worker and bounds it
/// with a timeout.
pub trait SourceOpener: Send + Sync {
    fn open(&self, uri: &str, events: PlayerEvents) -> Result<Box<dyn PlayerHandle>, OpenError>;
}
