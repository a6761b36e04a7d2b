//! Shared fixtures for engine integration tests
//!
//! `MockOpener` hands out scripted handles and keeps a record of each one so
//! tests can inspect them and drive completion/error callbacks.

#![allow(dead_code)]

use cadence_playback::{
    EngineConfig, EngineEvent, EngineHost, HandleId, OpenError, PlaybackEngine, PlayerErrorKind,
    PlayerEvents, PlayerHandle, SourceOpener, TrackRef, WakeLock,
};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const TRACK_DURATION: Duration = Duration::from_secs(180);

// ===== Tracks =====

pub fn create_test_track(id: &str) -> TrackRef {
    TrackRef::new(id, "/music")
}

pub fn create_test_tracks(ids: &[&str]) -> Vec<TrackRef> {
    ids.iter().map(|id| create_test_track(id)).collect()
}

pub fn uri(id: &str) -> String {
    create_test_track(id).uri()
}

// ===== Mock player =====

/// Everything the mock knows about one opened handle
#[derive(Debug)]
pub struct HandleRecord {
    pub id: HandleId,
    pub uri: String,
    pub playing: bool,
    pub released: bool,
    pub position: Duration,
    pub volume: f32,
    pub has_next: bool,
    events: PlayerEvents,
}

struct MockHandle {
    record: Arc<Mutex<HandleRecord>>,
}

impl PlayerHandle for MockHandle {
    fn start(&mut self) {
        self.record.lock().playing = true;
    }

    fn pause(&mut self) {
        self.record.lock().playing = false;
    }

    fn stop(&mut self) {
        self.record.lock().playing = false;
    }

    fn seek(&mut self, position: Duration) -> Duration {
        let reached = position.min(TRACK_DURATION);
        self.record.lock().position = reached;
        reached
    }

    fn position(&self) -> Duration {
        self.record.lock().position
    }

    fn duration(&self) -> Duration {
        TRACK_DURATION
    }

    fn is_playing(&self) -> bool {
        self.record.lock().playing
    }

    fn set_volume(&mut self, volume: f32) {
        self.record.lock().volume = volume;
    }

    fn set_next(&mut self, next: Option<&mut dyn PlayerHandle>) -> Result<(), OpenError> {
        self.record.lock().has_next = next.is_some();
        Ok(())
    }

    fn release(&mut self) {
        let mut record = self.record.lock();
        record.released = true;
        record.playing = false;
    }
}

#[derive(Default)]
struct MockInner {
    failing: HashSet<String>,
    open_calls: Vec<String>,
    handles: Vec<Arc<Mutex<HandleRecord>>>,
}

/// Scripted source opener
#[derive(Clone, Default)]
pub struct MockOpener {
    inner: Arc<Mutex<MockInner>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every open of `id` fail
    pub fn fail(&self, id: &str) {
        self.inner.lock().failing.insert(uri(id));
    }

    pub fn open_calls(&self) -> Vec<String> {
        self.inner.lock().open_calls.clone()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().open_calls.len()
    }

    /// Handles not yet released
    pub fn live_handles(&self) -> usize {
        self.inner
            .lock()
            .handles
            .iter()
            .filter(|h| !h.lock().released)
            .count()
    }

    fn playing_record(&self) -> Option<Arc<Mutex<HandleRecord>>> {
        self.inner
            .lock()
            .handles
            .iter()
            .find(|h| {
                let h = h.lock();
                h.playing && !h.released
            })
            .cloned()
    }

    /// URI of the handle producing audio
    pub fn playing_uri(&self) -> Option<String> {
        self.playing_record().map(|h| h.lock().uri.clone())
    }

    pub fn playing_volume(&self) -> Option<f32> {
        self.playing_record().map(|h| h.lock().volume)
    }

    /// Whether the playing handle has a next handle registered
    pub fn playing_has_next(&self) -> bool {
        self.playing_record().is_some_and(|h| h.lock().has_next)
    }

    pub fn set_playing_position(&self, position: Duration) {
        if let Some(record) = self.playing_record() {
            record.lock().position = position;
        }
    }

    /// Finish the playing handle; `false` when nothing is playing
    pub fn complete_playing(&self) -> bool {
        let Some(record) = self.playing_record() else {
            return false;
        };
        let events = {
            let mut record = record.lock();
            record.playing = false;
            record.position = TRACK_DURATION;
            record.events.clone()
        };
        events.completed();
        true
    }

    pub fn fail_playing(&self, kind: PlayerErrorKind) -> bool {
        let Some(record) = self.playing_record() else {
            return false;
        };
        let events = record.lock().events.clone();
        events.error(kind);
        true
    }

    fn live_record(&self, id: &str) -> Option<Arc<Mutex<HandleRecord>>> {
        let target = uri(id);
        self.inner
            .lock()
            .handles
            .iter()
            .rev()
            .find(|h| {
                let h = h.lock();
                h.uri == target && !h.released
            })
            .cloned()
    }

    /// Whether an unreleased handle for `id` exists
    pub fn is_live(&self, id: &str) -> bool {
        self.live_record(id).is_some()
    }

    /// Report an error from the newest live handle for `id`
    pub fn fail_live(&self, id: &str, kind: PlayerErrorKind) -> bool {
        let Some(record) = self.live_record(id) else {
            return false;
        };
        let events = record.lock().events.clone();
        events.error(kind);
        true
    }
}

impl SourceOpener for MockOpener {
    fn open(&self, uri: &str, events: PlayerEvents) -> Result<Box<dyn PlayerHandle>, OpenError> {
        let mut inner = self.inner.lock();
        inner.open_calls.push(uri.to_string());
        if inner.failing.contains(uri) {
            return Err(OpenError::NotFound(uri.to_string()));
        }

        let record = Arc::new(Mutex::new(HandleRecord {
            id: events.id(),
            uri: uri.to_string(),
            playing: false,
            released: false,
            position: Duration::ZERO,
            volume: 1.0,
            has_next: false,
            events,
        }));
        inner.handles.push(Arc::clone(&record));
        Ok(Box::new(MockHandle { record }))
    }
}

// ===== Wake lock =====

#[derive(Clone, Default)]
pub struct CountingWakeLock {
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl WakeLock for CountingWakeLock {
    fn acquire(&mut self, _timeout: Duration) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== Engine =====

/// Config with short recovery delays
pub fn test_config() -> EngineConfig {
    EngineConfig {
        server_died_retry_ms: 50,
        open_timeout_ms: 2_000,
        wake_lock_release_delay_ms: 20,
        ..EngineConfig::default()
    }
}

pub fn test_host(opener: &MockOpener) -> (EngineHost, Receiver<EngineEvent>) {
    let (tx, rx) = unbounded();
    let host = EngineHost::new(Arc::new(opener.clone()))
        .with_notifier(tx)
        .with_shuffle_seed(42);
    (host, rx)
}

pub fn create_engine(opener: &MockOpener) -> (PlaybackEngine, Receiver<EngineEvent>) {
    let (host, rx) = test_host(opener);
    let engine = PlaybackEngine::spawn(test_config(), host).expect("engine should start");
    (engine, rx)
}

/// Drain every event published so far
pub fn drain(rx: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
    rx.try_iter().collect()
}

pub fn changes(events: &[EngineEvent]) -> Vec<cadence_playback::Change> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Changed { change, .. } => Some(*change),
            _ => None,
        })
        .collect()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
