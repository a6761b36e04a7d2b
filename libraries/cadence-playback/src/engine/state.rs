//! Engine state and the operations the event loop applies to it
//!
//! Everything in here runs with the engine lock held, either on the event
//! loop thread or (for read-only queries) on a caller's thread.

use super::timers::{TimerKind, Timers};
use crate::config::EngineConfig;
use crate::events::{Change, ChangeNotifier, EngineEvent, TrackCatalog, WakeLock};
use crate::focus::{FocusAction, FocusArbiter, FocusChange};
use crate::persistence::{self, PersistedSnapshot};
use crate::queue::QueueStore;
use crate::sequencer::Sequencer;
use crate::source::{HandleId, PlayerErrorKind, PlayerSignal};
use crate::store::KeyValueStore;
use crate::transition::{Completion, ErrorOutcome, TransitionController};
use crate::types::{EnqueueAction, NowPlaying, RepeatMode, ShuffleMode, TrackRef};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub(crate) struct EngineCore {
    pub(super) config: EngineConfig,
    pub(super) queue: QueueStore,
    pub(super) sequencer: Sequencer,
    pub(super) controller: TransitionController,
    pub(super) focus: FocusArbiter,
    pub(super) timers: Timers,

    store: Box<dyn KeyValueStore>,
    notifier: Box<dyn ChangeNotifier>,
    catalog: Box<dyn TrackCatalog>,
    wake_lock: Box<dyn WakeLock>,
    card_id: i32,

    /// What the user asked for; the handle may briefly disagree while opening
    pub(super) is_supposed_to_be_playing: bool,
    open_failures: u32,
    pub(super) client_attached: bool,
    restoring: bool,

    /// Playing flag saved when the media server died, until recovery runs
    resume_after_server_death: bool,
}

/// Collaborators handed to [`EngineCore::new`]
pub(crate) struct Collaborators {
    pub store: Box<dyn KeyValueStore>,
    pub notifier: Box<dyn ChangeNotifier>,
    pub catalog: Box<dyn TrackCatalog>,
    pub wake_lock: Box<dyn WakeLock>,
    pub card_id: i32,
}

impl EngineCore {
    pub fn new(
        config: EngineConfig,
        sequencer: Sequencer,
        controller: TransitionController,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            queue: QueueStore::new(),
            sequencer,
            controller,
            focus: FocusArbiter::new(config.fade.clone()),
            timers: Timers::default(),
            store: collaborators.store,
            notifier: collaborators.notifier,
            catalog: collaborators.catalog,
            wake_lock: collaborators.wake_lock,
            card_id: collaborators.card_id,
            is_supposed_to_be_playing: false,
            open_failures: 0,
            client_attached: false,
            restoring: false,
            resume_after_server_death: false,
            config,
        }
    }

    // ===== Notifications and persistence =====

    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying {
            track: self.queue.current().cloned(),
            metadata: self.controller.metadata(),
            is_playing: self.is_supposed_to_be_playing,
        }
    }

    /// Persist, then publish
    fn notify(&mut self, change: Change) {
        match change {
            Change::QueueChanged => self.persist(true),
            Change::PositionChanged => {}
            _ => self.persist(false),
        }

        debug!("Notify {}", change.name());
        self.notifier.publish(EngineEvent::Changed {
            change,
            now_playing: self.now_playing(),
        });
    }

    fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            queue: self.queue.snapshot(),
            history: self.sequencer.history().iter().collect(),
            current: self.queue.current_index(),
            seek_position: self.controller.position().unwrap_or_default(),
            repeat_mode: self.sequencer.repeat_mode(),
            shuffle_mode: self.sequencer.shuffle_mode(),
            card_id: self.card_id,
        }
    }

    pub(super) fn persist(&mut self, full: bool) {
        if self.restoring {
            return;
        }

        let snapshot = self.snapshot();
        let result = if full {
            persistence::save_full(self.store.as_mut(), &snapshot)
        } else {
            persistence::save_partial(self.store.as_mut(), &snapshot)
        };
        if let Err(e) = result {
            warn!("Failed to persist playback state: {}", e);
        }
    }

    // ===== Idle handling =====

    /// Re-arm the idle timer unless a client is attached
    pub fn schedule_idle(&mut self) {
        if !self.client_attached {
            self.timers
                .schedule(TimerKind::Idle, self.config.idle_delay());
        }
    }

    fn go_idle(&mut self) {
        self.schedule_idle();
    }

    /// Idle-state transition that also drops the playing flag
    fn halt(&mut self) {
        self.go_idle();
        if self.is_supposed_to_be_playing {
            self.is_supposed_to_be_playing = false;
            self.notify(Change::PlayStateChanged);
        }
    }

    pub fn attach_client(&mut self) {
        self.client_attached = true;
        self.timers.cancel(TimerKind::Idle);
    }

    pub fn detach_client(&mut self) {
        self.client_attached = false;
        if self.is_supposed_to_be_playing || self.focus.is_paused_by_transient_loss() {
            return;
        }
        self.schedule_idle();
    }

    fn on_idle_timeout(&mut self) {
        if self.is_supposed_to_be_playing
            || self.focus.is_paused_by_transient_loss()
            || self.client_attached
            || self.resume_after_server_death
        {
            return;
        }

        info!("Engine idle, saving state");
        self.persist(true);
        self.notifier.publish(EngineEvent::Idle);
    }

    // ===== Source management =====

    /// Open the current entry, skipping unopenable entries, then prepare the
    /// next one
    ///
    /// `quiet` opens exactly once and never reports a playback failure.
    fn open_current_and_next(&mut self, quiet: bool) {
        self.controller.stop();

        loop {
            let Some(track) = self.queue.current().cloned() else {
                return;
            };

            let error = match self.controller.set_current_source(&track.uri()) {
                Ok(()) => {
                    self.open_failures = 0;
                    break;
                }
                Err(e) => e,
            };
            warn!("Failed to open {}: {}", track, error);

            if !quiet
                && self.open_failures < self.config.max_open_failures
                && self.queue.len() > 1
            {
                self.open_failures += 1;
                let advance = self.sequencer.next_position(&mut self.queue, false);
                if advance.queue_changed {
                    self.notify(Change::QueueChanged);
                }
                match advance.position {
                    Some(position) => {
                        debug!("Skipping to entry {}", position);
                        self.queue.set_current(position);
                    }
                    None => {
                        self.halt();
                        return;
                    }
                }
            } else {
                self.open_failures = 0;
                if !quiet {
                    error!("Giving up after repeated open failures");
                    self.notifier
                        .publish(EngineEvent::PlaybackFailed { track: Some(track) });
                }
                self.halt();
                return;
            }
        }

        self.set_next_track();
    }

    /// Decide the next entry and prepare its handle
    fn set_next_track(&mut self) {
        let advance = self.sequencer.next_position(&mut self.queue, false);
        self.queue.set_next_index(advance.position);

        let uri = advance
            .position
            .and_then(|position| self.queue.get(position))
            .map(TrackRef::uri);
        self.controller.prepare_next_source(uri.as_deref());

        if advance.queue_changed {
            self.notify(Change::QueueChanged);
        }
    }

    /// Prepare a new next handle if a source is loaded
    fn refresh_next_track(&mut self) {
        if self.controller.is_initialized() {
            self.set_next_track();
        }
    }

    fn play_if_ready(&mut self) {
        if self.controller.is_initialized() {
            self.play();
        }
    }

    /// Stop the handle and re-open the current entry
    fn reopen_current(&mut self) {
        self.controller.stop();
        self.open_current_and_next(false);
    }

    // ===== Commands =====

    pub fn open(&mut self, tracks: &[TrackRef], position: Option<usize>) {
        if self.sequencer.shuffle_mode() == ShuffleMode::Auto {
            self.sequencer.set_shuffle_mode(ShuffleMode::Normal);
            self.sequencer.clear_auto_pool();
            self.notify(Change::ShuffleModeChanged);
        }

        let previous = self.queue.current().cloned();
        if !self.queue.matches(tracks) {
            self.queue.replace(tracks);
            self.notify(Change::QueueChanged);
        }

        let len = self.queue.len();
        if len == 0 {
            self.controller.stop();
            self.halt();
            self.notify(Change::MetaChanged);
            return;
        }

        let position = match position {
            Some(position) => position.min(len - 1),
            None => self.sequencer.shuffler_mut().next_int(len),
        };
        self.queue.set_current(position);
        self.sequencer.history_mut().clear();
        self.open_current_and_next(false);

        if self.queue.current() != previous.as_ref() {
            self.notify(Change::MetaChanged);
        }
    }

    pub fn enqueue(&mut self, tracks: &[TrackRef], action: EnqueueAction) {
        if tracks.is_empty() {
            return;
        }
        let was_empty = self.queue.is_empty();

        match (action, self.queue.current_index()) {
            (EnqueueAction::Next, Some(current)) if current + 1 < self.queue.len() => {
                self.queue.insert_at(tracks, current + 1);
                self.notify(Change::QueueChanged);
            }
            _ => {
                let first_new = self.queue.len();
                self.queue.insert_at(tracks, first_new);
                self.notify(Change::QueueChanged);

                if action == EnqueueAction::Now {
                    self.queue.set_current(first_new);
                    self.open_current_and_next(false);
                    self.play_if_ready();
                    self.notify(Change::MetaChanged);
                    return;
                }
            }
        }

        if was_empty {
            self.queue.set_current(0);
            self.open_current_and_next(false);
            self.play_if_ready();
            self.notify(Change::MetaChanged);
        } else {
            self.refresh_next_track();
        }
    }

    pub fn play(&mut self) {
        if self.controller.is_initialized() {
            let duration = self.controller.duration().unwrap_or_default();
            let position = self.controller.position().unwrap_or_default();
            let threshold = self.config.restart_threshold();
            if self.sequencer.repeat_mode() != RepeatMode::Current
                && duration > threshold
                && position >= duration - threshold
            {
                debug!("Play requested at the end of the track, advancing");
                // Starts the new entry itself, or halts if nothing opens
                self.next(true);
                return;
            }

            self.controller.start();
            self.timers.cancel(TimerKind::FadeDown);
            self.timers.schedule(TimerKind::FadeUp, Duration::ZERO);

            if !self.is_supposed_to_be_playing {
                self.is_supposed_to_be_playing = true;
                self.notify(Change::PlayStateChanged);
            }
        } else if self.queue.is_empty() {
            self.set_shuffle_mode(ShuffleMode::Auto);
        } else {
            self.open_current_and_next(false);
            self.play_if_ready();
        }
    }

    pub fn pause(&mut self) {
        self.timers.cancel(TimerKind::FadeUp);
        if self.is_supposed_to_be_playing {
            self.controller.pause();
            self.go_idle();
            self.is_supposed_to_be_playing = false;
            self.notify(Change::PlayStateChanged);
        }
    }

    pub fn stop(&mut self) {
        self.controller.stop();
        self.halt();
    }

    pub fn next(&mut self, force: bool) {
        if self.queue.is_empty() {
            return;
        }

        let advance = self.sequencer.next_position(&mut self.queue, force);
        if advance.queue_changed {
            self.notify(Change::QueueChanged);
        }
        let Some(position) = advance.position else {
            info!("Reached the end of the queue");
            self.halt();
            return;
        };

        self.queue.set_current(position);
        self.reopen_current();
        self.play_if_ready();
        self.notify(Change::MetaChanged);
    }

    pub fn prev(&mut self) {
        let Some(position) = self.sequencer.previous_position(&self.queue) else {
            return;
        };

        self.queue.set_current(position);
        self.reopen_current();
        self.play_if_ready();
        self.notify(Change::MetaChanged);
    }

    /// Seek within the current source, clamped to its duration
    pub fn seek(&mut self, position: Duration) -> Option<Duration> {
        let duration = self.controller.duration()?;
        let reached = self.controller.seek(position.min(duration))?;
        self.notify(Change::PositionChanged);
        Some(reached)
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.sequencer.set_repeat_mode(mode);
        self.refresh_next_track();
        self.notify(Change::RepeatModeChanged);
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        let previous = self.sequencer.shuffle_mode();
        if previous == mode && !self.queue.is_empty() {
            return;
        }

        if mode == ShuffleMode::Auto {
            if self.sequencer.set_auto_pool(self.catalog.all_tracks()) {
                info!(
                    "Auto shuffle over {} tracks",
                    self.sequencer.auto_window().pool_len()
                );
                self.sequencer.set_shuffle_mode(ShuffleMode::Auto);
                self.queue.clear();
                self.sequencer.maintain_auto_window(&mut self.queue);
                self.queue.set_current(0);
                self.notify(Change::QueueChanged);

                self.open_current_and_next(false);
                self.play_if_ready();
                self.notify(Change::MetaChanged);
                self.notify(Change::ShuffleModeChanged);
                return;
            }
            warn!("Catalog is empty, auto shuffle unavailable");
        }

        let mode = if mode == ShuffleMode::Auto {
            ShuffleMode::None
        } else {
            mode
        };
        if previous == ShuffleMode::Auto {
            self.sequencer.clear_auto_pool();
        }
        self.sequencer.set_shuffle_mode(mode);
        self.refresh_next_track();
        self.notify(Change::ShuffleModeChanged);
    }

    pub fn move_queue_item(&mut self, from: usize, to: usize) {
        if self.queue.is_empty() {
            return;
        }
        self.queue.move_item(from, to);
        self.refresh_next_track();
        self.notify(Change::QueueChanged);
    }

    pub fn remove_range(&mut self, first: usize, last: usize) -> usize {
        let removed = self.queue.remove_range(first, last);
        if removed.count > 0 {
            self.after_removal(removed.current_removed);
            self.notify(Change::QueueChanged);
        }
        removed.count
    }

    /// Remove every occurrence of `track`
    pub fn remove_track(&mut self, track: &TrackRef) -> usize {
        let mut count = 0;
        let mut current_removed = false;
        while let Some(index) = self.queue.position_of(track) {
            let removed = self.queue.remove_range(index, index);
            count += removed.count;
            current_removed |= removed.current_removed;
        }

        if count > 0 {
            self.after_removal(current_removed);
            self.notify(Change::QueueChanged);
        }
        count
    }

    fn after_removal(&mut self, current_removed: bool) {
        if !current_removed {
            self.refresh_next_track();
            return;
        }

        if self.queue.is_empty() {
            self.controller.stop();
            self.halt();
        } else {
            let was_playing = self.is_supposed_to_be_playing;
            self.reopen_current();
            if was_playing {
                self.play_if_ready();
            }
        }
        self.notify(Change::MetaChanged);
    }

    // ===== Player, focus and timer events =====

    pub fn on_player_signal(&mut self, id: HandleId, signal: PlayerSignal) {
        match signal {
            PlayerSignal::Completed => match self.controller.on_completed(id) {
                Completion::WentToNext => {
                    if let Some(next) = self.queue.next_index() {
                        self.queue.set_current(next);
                    }
                    self.notify(Change::MetaChanged);
                    self.set_next_track();
                }
                Completion::TrackEnded => self.on_track_ended(),
                Completion::Stale => {}
            },
            PlayerSignal::Error(kind) => self.on_player_error(id, kind),
        }
    }

    fn on_player_error(&mut self, id: HandleId, kind: PlayerErrorKind) {
        match self.controller.on_error(id, kind) {
            ErrorOutcome::ServerDied => {
                self.resume_after_server_death = self.is_supposed_to_be_playing;
                if self.is_supposed_to_be_playing {
                    self.is_supposed_to_be_playing = false;
                    self.notify(Change::PlayStateChanged);
                }
                self.timers
                    .schedule(TimerKind::ServerDied, self.config.server_died_retry());
            }
            ErrorOutcome::TrackEnded => self.on_track_ended(),
            ErrorOutcome::NextDropped => self.queue.set_next_index(None),
            ErrorOutcome::Stale => {}
        }
    }

    fn on_track_ended(&mut self) {
        self.wake_lock.acquire(self.config.wake_lock_timeout());

        if self.sequencer.repeat_mode() == RepeatMode::Current {
            self.controller.seek(Duration::ZERO);
            self.play();
        } else {
            self.next(false);
        }

        self.timers.schedule(
            TimerKind::ReleaseWakeLock,
            self.config.wake_lock_release_delay(),
        );
    }

    pub fn on_focus_change(&mut self, change: FocusChange) {
        match self
            .focus
            .on_focus_change(change, self.is_supposed_to_be_playing)
        {
            FocusAction::Pause => self.pause(),
            FocusAction::Duck => {
                self.timers.cancel(TimerKind::FadeUp);
                self.timers.schedule(TimerKind::FadeDown, Duration::ZERO);
            }
            FocusAction::ResumeFromSilence => {
                self.controller.set_volume(self.focus.volume());
                self.play();
            }
            FocusAction::FadeUp => {
                self.timers.cancel(TimerKind::FadeDown);
                self.timers.schedule(TimerKind::FadeUp, Duration::ZERO);
            }
        }
    }

    pub fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::FadeDown => {
                let again = self.focus.fade_down_tick();
                self.controller.set_volume(self.focus.volume());
                if let Some(delay) = again {
                    self.timers.schedule(TimerKind::FadeDown, delay);
                }
            }
            TimerKind::FadeUp => {
                let again = self.focus.fade_up_tick();
                self.controller.set_volume(self.focus.volume());
                if let Some(delay) = again {
                    self.timers.schedule(TimerKind::FadeUp, delay);
                }
            }
            TimerKind::ServerDied => {
                let resume = std::mem::take(&mut self.resume_after_server_death);
                if self.controller.is_initialized() {
                    debug!("Source reopened before server death recovery");
                } else if resume {
                    info!("Recovering from media server death, advancing");
                    self.next(true);
                } else {
                    info!("Recovering from media server death");
                    self.open_current_and_next(false);
                }
            }
            TimerKind::ReleaseWakeLock => self.wake_lock.release(),
            TimerKind::Idle => self.on_idle_timeout(),
        }
    }

    // ===== Lifecycle =====

    /// Restore the persisted snapshot
    ///
    /// Opens the restored entry quietly; nothing is persisted while restoring.
    pub fn restore(&mut self) {
        self.restoring = true;
        let snapshot = persistence::load(self.store.as_ref(), self.card_id);

        self.sequencer.set_repeat_mode(snapshot.repeat_mode);
        let mut shuffle_mode = snapshot.shuffle_mode;
        if shuffle_mode == ShuffleMode::Auto
            && !self.sequencer.set_auto_pool(self.catalog.all_tracks())
        {
            warn!("Catalog is empty, restoring without auto shuffle");
            shuffle_mode = ShuffleMode::None;
        }
        self.sequencer.set_shuffle_mode(shuffle_mode);
        if shuffle_mode != ShuffleMode::None {
            self.sequencer.history_mut().restore(&snapshot.history);
        }

        if let Some(current) = snapshot.current {
            self.queue.replace(&snapshot.queue);
            self.queue.set_current(current);
            self.open_current_and_next(true);

            if self.controller.is_initialized() {
                let duration = self.controller.duration().unwrap_or_default();
                if snapshot.seek_position < duration {
                    self.controller.seek(snapshot.seek_position);
                }
                info!(
                    "Restored queue of {} entries at {}",
                    self.queue.len(),
                    current
                );
            } else {
                warn!("Restored entry could not be opened, dropping queue");
                self.queue.clear();
                self.sequencer.history_mut().clear();
            }
        }

        self.restoring = false;
    }

    pub fn shutdown(&mut self) {
        self.persist(true);
        self.controller.stop();
        self.timers = Timers::default();
        info!("Playback engine stopped");
    }
}
