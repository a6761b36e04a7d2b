//! Playback engine: one event loop serializing every command and callback
//!
//! [`PlaybackEngine::spawn`] restores the persisted snapshot and starts a
//! worker thread that owns all mutation. Commands are posted as closures and
//! the caller blocks until the loop has applied them; player callbacks, focus
//! changes and timers enter through the same FIFO. Read-only queries take the
//! engine lock directly from the caller's thread.
//!
//! Commands must not be issued from inside a [`ChangeNotifier`] or a
//! [`PlayerHandle`] method, which run on the loop thread: the call would wait
//! on itself.
//!
//! [`PlayerHandle`]: crate::PlayerHandle

mod state;
mod event_loop;
mod timers;

use self::state::{Collaborators, EngineCore};
use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{ChangeNotifier, NoWakeLock, NullNotifier, TrackCatalog, WakeLock};
use crate::focus::FocusChange;
use crate::sequencer::Sequencer;
use crate::shuffle::Shuffler;
use crate::source::{HandleId, PlayerSignal, SourceOpener};
use crate::store::{KeyValueStore, MemoryStore};
use crate::transition::TransitionController;
use crate::types::{EnqueueAction, NowPlaying, RepeatMode, ShuffleMode, TrackRef};
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

pub(crate) type Command = Box<dyn FnOnce(&mut EngineCore) + Send>;

/// Event loop message
pub(crate) enum Message {
    Command(Command),
    Player { id: HandleId, signal: PlayerSignal },
    Focus(FocusChange),
    Shutdown,
}

/// Platform collaborators the engine runs against
pub struct EngineHost {
    opener: Arc<dyn SourceOpener>,
    store: Box<dyn KeyValueStore>,
    notifier: Box<dyn ChangeNotifier>,
    catalog: Box<dyn TrackCatalog>,
    wake_lock: Box<dyn WakeLock>,
    card_id: i32,
    shuffle_seed: Option<u64>,
}

impl EngineHost {
    /// Host with an in-memory store, no listeners, an empty catalog and no
    /// wake lock
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            opener,
            store: Box::new(MemoryStore::new()),
            notifier: Box::new(NullNotifier),
            catalog: Box::new(Vec::<TrackRef>::new()),
            wake_lock: Box::new(NoWakeLock),
            card_id: 0,
            shuffle_seed: None,
        }
    }

    pub fn with_store(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_notifier(mut self, notifier: impl ChangeNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_catalog(mut self, catalog: impl TrackCatalog + 'static) -> Self {
        self.catalog = Box::new(catalog);
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: impl WakeLock + 'static) -> Self {
        self.wake_lock = Box::new(wake_lock);
        self
    }

    /// Storage device id; a persisted queue from another card is discarded
    pub fn with_card_id(mut self, card_id: i32) -> Self {
        self.card_id = card_id;
        self
    }

    /// Make shuffle choices reproducible
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

/// Handle to a running playback engine
///
/// Dropping the handle shuts the engine down after persisting its state.
pub struct PlaybackEngine {
    core: Arc<Mutex<EngineCore>>,
    tx: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Restore persisted state and start the event loop
    pub fn spawn(config: EngineConfig, host: EngineHost) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = unbounded();
        let controller = TransitionController::new(host.opener, tx.clone(), config.open_timeout());
        let shuffler = host
            .shuffle_seed
            .map_or_else(Shuffler::new, Shuffler::from_seed);
        let sequencer = Sequencer::with_shuffler(&config, shuffler);

        let mut core = EngineCore::new(
            config,
            sequencer,
            controller,
            Collaborators {
                store: host.store,
                notifier: host.notifier,
                catalog: host.catalog,
                wake_lock: host.wake_lock,
                card_id: host.card_id,
            },
        );
        core.restore();
        core.schedule_idle();

        let core = Arc::new(Mutex::new(core));
        let worker = thread::Builder::new()
            .name("cadence-engine".to_string())
            .spawn({
                let core = Arc::clone(&core);
                move || event_loop::run(core, rx)
            })?;

        Ok(Self {
            core,
            tx,
            worker: Some(worker),
        })
    }

    /// Run `f` on the event loop and wait for its result
    fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut EngineCore) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let command: Command = Box::new(move |core: &mut EngineCore| {
            core.schedule_idle();
            let _ = reply_tx.send(f(core));
        });

        self.tx
            .send(Message::Command(command))
            .map_err(|_| PlaybackError::EngineStopped)?;
        reply_rx.recv().map_err(|_| PlaybackError::EngineStopped)
    }

    // ===== Commands =====

    /// Load `tracks` as the queue and open `position` (random when `None`)
    ///
    /// Does not start playback.
    pub fn open(&self, tracks: Vec<TrackRef>, position: Option<usize>) -> Result<()> {
        self.call(move |core| core.open(&tracks, position))
    }

    pub fn enqueue(&self, tracks: Vec<TrackRef>, action: EnqueueAction) -> Result<()> {
        self.call(move |core| core.enqueue(&tracks, action))
    }

    pub fn play(&self) -> Result<()> {
        self.call(EngineCore::play)
    }

    pub fn pause(&self) -> Result<()> {
        self.call(EngineCore::pause)
    }

    /// Stop playback and release the player
    pub fn stop(&self) -> Result<()> {
        self.call(EngineCore::stop)
    }

    /// Skip to the next entry; `force` wraps around and ignores repeat-current
    pub fn next(&self, force: bool) -> Result<()> {
        self.call(move |core| core.next(force))
    }

    pub fn prev(&self) -> Result<()> {
        self.call(EngineCore::prev)
    }

    /// Seek the current track; returns the position reached, `None` when
    /// nothing is loaded
    pub fn seek(&self, position: Duration) -> Result<Option<Duration>> {
        self.call(move |core| core.seek(position))
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.call(move |core| core.set_repeat_mode(mode))
    }

    pub fn set_shuffle_mode(&self, mode: ShuffleMode) -> Result<()> {
        self.call(move |core| core.set_shuffle_mode(mode))
    }

    pub fn move_queue_item(&self, from: usize, to: usize) -> Result<()> {
        self.call(move |core| core.move_queue_item(from, to))
    }

    /// Remove entries `first..=last`; returns how many were removed
    pub fn remove_range(&self, first: usize, last: usize) -> Result<usize> {
        self.call(move |core| core.remove_range(first, last))
    }

    /// Remove every occurrence of `track`; returns how many were removed
    pub fn remove_track(&self, track: TrackRef) -> Result<usize> {
        self.call(move |core| core.remove_track(&track))
    }

    /// A client (UI) attached; the idle timer is suspended
    pub fn attach_client(&self) -> Result<()> {
        self.call(EngineCore::attach_client)
    }

    pub fn detach_client(&self) -> Result<()> {
        self.call(EngineCore::detach_client)
    }

    /// Report an audio focus change; handled asynchronously
    pub fn focus_changed(&self, change: FocusChange) -> Result<()> {
        self.tx
            .send(Message::Focus(change))
            .map_err(|_| PlaybackError::EngineStopped)
    }

    /// Wait until every message posted before this call has been handled
    pub fn sync(&self) -> Result<()> {
        self.call(|_| ())
    }

    // ===== Queries =====

    pub fn queue(&self) -> Vec<TrackRef> {
        self.core.lock().queue.snapshot()
    }

    pub fn queue_position(&self) -> Option<usize> {
        self.core.lock().queue.current_index()
    }

    /// Whether playback is requested (not necessarily audible yet)
    pub fn is_playing(&self) -> bool {
        self.core.lock().is_supposed_to_be_playing
    }

    pub fn position(&self) -> Option<Duration> {
        self.core.lock().controller.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.core.lock().controller.duration()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.core.lock().sequencer.repeat_mode()
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.core.lock().sequencer.shuffle_mode()
    }

    pub fn now_playing(&self) -> NowPlaying {
        self.core.lock().now_playing()
    }

    /// Current focus volume in `[0.0, 1.0]`
    pub fn volume(&self) -> f32 {
        self.core.lock().controller.volume()
    }

    /// Persist state and stop the event loop
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // The loop may already be gone; joining is enough then
        let _ = self.tx.send(Message::Shutdown);
        worker.join().map_err(|_| PlaybackError::EngineStopped)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            warn!("Playback engine did not shut down cleanly: {}", e);
        }
    }
}
