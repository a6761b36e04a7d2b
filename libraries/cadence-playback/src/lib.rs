//! Cadence - Background Playback Engine
//!
//! The engine owns the play queue, the shuffle/repeat policy and the gapless
//! hand-off between the current track and the next one. Everything else (UI,
//! notifications, metadata scraping, transport to a UI process) lives outside.
//!
//! This crate provides:
//! - Play queue with current/next cursors (insert, remove range, move, replace)
//! - Shuffle with bounded history and a party-shuffle window
//! - Repeat modes (None, Current, All)
//! - Gapless transitions through a pre-prepared second player handle
//! - Bounded recovery from open failures and media server death
//! - Audio focus handling with fade down/up
//! - Compact persisted snapshot that survives partial corruption
//!
//! # Architecture
//!
//! All mutation happens on a single event loop thread. Commands block the
//! caller until the loop applied them; player callbacks, focus changes and
//! timers are queued on the same FIFO. Decoding and output are platform
//! concerns supplied through [`SourceOpener`] and [`PlayerHandle`].
//!
//! # Example: Running the engine
//!
//! ```rust,no_run
//! use cadence_playback::{
//!     EngineConfig, EngineEvent, EngineHost, OpenError, PlaybackEngine, PlayerEvents,
//!     PlayerHandle, RepeatMode, SourceOpener, TrackRef,
//! };
//! use std::sync::Arc;
//!
//! struct MyOpener;
//!
//! impl SourceOpener for MyOpener {
//!     fn open(
//!         &self,
//!         uri: &str,
//!         events: PlayerEvents,
//!     ) -> Result<Box<dyn PlayerHandle>, OpenError> {
//!         // Load and prepare `uri` with the platform player, keep `events`
//!         // to report completion
//!         Err(OpenError::Unsupported(uri.to_string()))
//!     }
//! }
//!
//! let (tx, rx) = crossbeam_channel::unbounded::<EngineEvent>();
//! let host = EngineHost::new(Arc::new(MyOpener)).with_notifier(tx);
//! let engine = PlaybackEngine::spawn(EngineConfig::default(), host)?;
//!
//! engine.open(
//!     vec![
//!         TrackRef::new("1", "/music"),
//!         TrackRef::new("2", "/music"),
//!     ],
//!     Some(0),
//! )?;
//! engine.set_repeat_mode(RepeatMode::All)?;
//! engine.play()?;
//!
//! for event in rx.try_iter() {
//!     println!("{event:?}");
//! }
//! # Ok::<(), cadence_playback::PlaybackError>(())
//! ```
//!
//! # Example: Queue policy without an engine
//!
//! ```rust
//! use cadence_playback::{EngineConfig, QueueStore, Sequencer, Shuffler, TrackRef};
//!
//! let mut queue = QueueStore::new();
//! queue.replace(&[TrackRef::new("a", "/music"), TrackRef::new("b", "/music")]);
//!
//! let mut sequencer = Sequencer::with_shuffler(&EngineConfig::default(), Shuffler::from_seed(1));
//! assert_eq!(sequencer.next_position(&mut queue, false).position, Some(1));
//! ```

mod auto_shuffle;
mod config;
mod engine;
mod error;
mod events;
mod focus;
mod history;
pub mod persistence;
mod queue;
mod sequencer;
mod shuffle;
mod source;
pub mod store;
mod transition;
pub mod types;

// Public exports
pub use auto_shuffle::AutoShuffleWindow;
pub use config::{AutoShuffleConfig, EngineConfig, FadeConfig};
pub use engine::{EngineHost, PlaybackEngine};
pub use error::{OpenError, PlaybackError, Result, StoreError};
pub use events::{
    Change, ChangeNotifier, EngineEvent, NoWakeLock, NullNotifier, TrackCatalog, WakeLock,
};
pub use focus::{FocusAction, FocusArbiter, FocusChange};
pub use history::History;
pub use persistence::PersistedSnapshot;
pub use queue::{QueueStore, RemovedRange};
pub use sequencer::{Advance, Sequencer};
pub use shuffle::Shuffler;
pub use source::{HandleId, PlayerErrorKind, PlayerEvents, PlayerHandle, SourceOpener};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use transition::{Completion, ErrorOutcome, HandleState, TransitionController};
pub use types::{EnqueueAction, NowPlaying, RepeatMode, ShuffleMode, TrackMetadata, TrackRef};
