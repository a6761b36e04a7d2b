//! Current/next player handles and gapless hand-off
//!
//! The controller owns at most two handles: the current one and an optional
//! next one registered to start when the current one completes. Every open
//! runs on its own short-lived worker thread so a hung platform open is
//! bounded by a timeout and never holds up later opens. A handle that arrives
//! after its caller gave up is released by its worker.

use crate::engine::Message;
use crate::error::OpenError;
use crate::source::{HandleId, PlayerErrorKind, PlayerEvents, PlayerHandle, SourceOpener};
use crate::types::TrackMetadata;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State of the current handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    NoSource,
    Prepared,
    Playing,
    Paused,
}

/// What a completion signal meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The registered next handle took over
    WentToNext,

    /// Nothing was registered; the engine decides what happens
    TrackEnded,

    /// Signal from a handle that is no longer current
    Stale,
}

/// What an error signal meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Both handles were torn down; recover after a delay
    ServerDied,

    /// Treat like the end of the track
    TrackEnded,

    /// The prepared next handle failed and was dropped
    NextDropped,

    Stale,
}

struct Slot {
    id: HandleId,
    handle: Box<dyn PlayerHandle>,
    state: HandleState,
}

impl Slot {
    fn release(mut self) {
        debug!("Releasing handle {}", self.id);
        self.handle.release();
    }
}

type OpenReply = Result<Box<dyn PlayerHandle>, OpenError>;

/// Owner of the current and next player handles
pub struct TransitionController {
    opener: Arc<dyn SourceOpener>,
    events_tx: Sender<Message>,
    current: Option<Slot>,
    next: Option<Slot>,
    last_id: u64,
    open_timeout: Duration,
    volume: f32,
}

impl TransitionController {
    pub(crate) fn new(
        opener: Arc<dyn SourceOpener>,
        events_tx: Sender<Message>,
        open_timeout: Duration,
    ) -> Self {
        Self {
            opener,
            events_tx,
            current: None,
            next: None,
            last_id: 0,
            open_timeout,
            volume: 1.0,
        }
    }

    fn open(&mut self, uri: &str) -> Result<Slot, OpenError> {
        self.last_id += 1;
        let id = HandleId(self.last_id);
        let events = PlayerEvents::new(id, self.events_tx.clone());
        let (reply, reply_rx) = bounded::<OpenReply>(1);
        let opener = Arc::clone(&self.opener);
        let request_uri = uri.to_string();

        // Detached: a hung platform open must not block the caller or shutdown
        thread::Builder::new()
            .name("cadence-opener".to_string())
            .spawn(move || {
                let result = opener.open(&request_uri, events);
                if let Err(err) = reply.send(result) {
                    if let Ok(mut late) = err.into_inner() {
                        warn!("Open of {} finished after timeout, releasing", request_uri);
                        late.release();
                    }
                }
            })?;

        let handle = match reply_rx.recv_timeout(self.open_timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => return Err(OpenError::TimedOut(self.open_timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(OpenError::Other("opener worker exited".to_string()))
            }
        };

        debug!("Opened {} as handle {}", uri, id);
        Ok(Slot {
            id,
            handle,
            state: HandleState::Prepared,
        })
    }

    /// Replace the current handle with a freshly prepared one for `uri`
    ///
    /// Any registered next handle is released as well. On failure no source
    /// is loaded.
    pub fn set_current_source(&mut self, uri: &str) -> Result<(), OpenError> {
        self.release_all();

        let mut slot = self.open(uri)?;
        slot.handle.set_volume(self.volume);
        self.current = Some(slot);
        Ok(())
    }

    /// Prepare `uri` to play right after the current handle
    ///
    /// The previous next handle is always released first; `None` leaves no
    /// next. Returns whether a next handle is now registered.
    pub fn prepare_next_source(&mut self, uri: Option<&str>) -> bool {
        if let Some(current) = self.current.as_mut() {
            if let Err(e) = current.handle.set_next(None) {
                debug!("Clearing next registration failed: {}", e);
            }
        }
        if let Some(old) = self.next.take() {
            old.release();
        }

        let Some(uri) = uri else {
            return false;
        };
        if self.current.is_none() {
            return false;
        }

        let mut next = match self.open(uri) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Failed to prepare next source {}: {}", uri, e);
                return false;
            }
        };

        let Some(current) = self.current.as_mut() else {
            next.release();
            return false;
        };
        match current.handle.set_next(Some(next.handle.as_mut())) {
            Ok(()) => {
                debug!("Handle {} registered after {}", next.id, current.id);
                self.next = Some(next);
                true
            }
            Err(e) => {
                warn!("Failed to register next source {}: {}", uri, e);
                next.release();
                false
            }
        }
    }

    /// Handle a completion signal
    pub fn on_completed(&mut self, id: HandleId) -> Completion {
        if self.current_id() != Some(id) {
            debug!("Ignoring completion from stale handle {}", id);
            return Completion::Stale;
        }

        match self.next.take() {
            Some(mut next) => {
                if let Some(old) = self.current.take() {
                    old.release();
                }
                if !next.handle.is_playing() {
                    next.handle.start();
                }
                next.handle.set_volume(self.volume);
                next.state = HandleState::Playing;
                info!("Gapless hand-off to handle {}", next.id);
                self.current = Some(next);
                Completion::WentToNext
            }
            None => {
                if let Some(current) = self.current.as_mut() {
                    current.state = HandleState::Paused;
                }
                Completion::TrackEnded
            }
        }
    }

    /// Handle an error signal
    pub fn on_error(&mut self, id: HandleId, kind: PlayerErrorKind) -> ErrorOutcome {
        if self.next.as_ref().is_some_and(|next| next.id == id) {
            warn!("Prepared next handle {} failed: {:?}", id, kind);
            if let Some(current) = self.current.as_mut() {
                if let Err(e) = current.handle.set_next(None) {
                    debug!("Clearing next registration failed: {}", e);
                }
            }
            if let Some(next) = self.next.take() {
                next.release();
            }
            return ErrorOutcome::NextDropped;
        }

        if self.current_id() != Some(id) {
            debug!("Ignoring error from stale handle {}", id);
            return ErrorOutcome::Stale;
        }

        match kind {
            PlayerErrorKind::ServerDied => {
                warn!("Media server died under handle {}", id);
                self.release_all();
                ErrorOutcome::ServerDied
            }
            PlayerErrorKind::Other(code) => {
                warn!("Player error {} on handle {}", code, id);
                ErrorOutcome::TrackEnded
            }
        }
    }

    pub fn start(&mut self) {
        if let Some(current) = self.current.as_mut() {
            current.handle.start();
            current.state = HandleState::Playing;
        }
    }

    pub fn pause(&mut self) {
        if let Some(current) = self.current.as_mut() {
            if current.state == HandleState::Playing {
                current.handle.pause();
                current.state = HandleState::Paused;
            }
        }
    }

    /// Stop playback and release both handles
    pub fn stop(&mut self) {
        if let Some(current) = self.current.as_mut() {
            current.handle.stop();
        }
        self.release_all();
    }

    fn release_all(&mut self) {
        if let Some(next) = self.next.take() {
            next.release();
        }
        if let Some(current) = self.current.take() {
            current.release();
        }
    }

    /// Seek the current handle; `None` without a source
    pub fn seek(&mut self, position: Duration) -> Option<Duration> {
        self.current
            .as_mut()
            .map(|current| current.handle.seek(position))
    }

    pub fn position(&self) -> Option<Duration> {
        self.current.as_ref().map(|current| current.handle.position())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.current.as_ref().map(|current| current.handle.duration())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(current) = self.current.as_mut() {
            current.handle.set_volume(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn metadata(&self) -> TrackMetadata {
        self.current
            .as_ref()
            .map(|current| current.handle.metadata())
            .unwrap_or_default()
    }

    /// Whether a current source is loaded
    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn state(&self) -> HandleState {
        self.current
            .as_ref()
            .map_or(HandleState::NoSource, |current| current.state)
    }

    pub fn current_id(&self) -> Option<HandleId> {
        self.current.as_ref().map(|current| current.id)
    }

    pub fn next_id(&self) -> Option<HandleId> {
        self.next.as_ref().map(|next| next.id)
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

impl Drop for TransitionController {
    fn drop(&mut self) {
        self.release_all();
    }
}
