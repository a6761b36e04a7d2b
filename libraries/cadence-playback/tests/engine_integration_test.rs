//! End-to-end tests for the playback engine
//!
//! Drives a real engine (event loop, transition controller, persistence)
//! against the scripted `MockOpener`.

mod common;

use cadence_playback::{
    Change, EngineConfig, EngineEvent, EnqueueAction, FocusChange, PlaybackEngine,
    PlayerErrorKind, RepeatMode, ShuffleMode, TrackRef,
};
use common::*;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn playing_engine(ids: &[&str], position: usize) -> (PlaybackEngine, MockOpener) {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine.open(create_test_tracks(ids), Some(position)).unwrap();
    engine.play().unwrap();
    (engine, opener)
}

fn catalog(size: usize) -> Vec<TrackRef> {
    (0..size)
        .map(|i| TrackRef::new(i.to_string(), "/library"))
        .collect()
}

fn failures(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PlaybackFailed { .. }))
        .count()
}

// ===== Open / enqueue =====

#[test]
fn open_prepares_current_and_next_without_playing() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);

    engine
        .open(create_test_tracks(&["A", "B", "C"]), Some(0))
        .unwrap();

    assert!(!engine.is_playing());
    assert_eq!(engine.queue_position(), Some(0));
    assert_eq!(opener.open_calls(), vec![uri("A"), uri("B")]);
    assert_eq!(
        changes(&drain(&rx)),
        vec![Change::QueueChanged, Change::MetaChanged]
    );
}

#[test]
fn reopening_same_list_does_not_signal_queue_change() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);
    let tracks = create_test_tracks(&["A", "B"]);

    engine.open(tracks.clone(), Some(0)).unwrap();
    drain(&rx);
    engine.open(tracks, Some(0)).unwrap();

    assert!(changes(&drain(&rx)).is_empty());
}

#[test]
fn opening_empty_list_clears_now_playing() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    drain(&rx);

    engine.open(Vec::new(), None).unwrap();

    assert_eq!(
        changes(&drain(&rx)),
        vec![Change::QueueChanged, Change::MetaChanged]
    );
    assert_eq!(engine.queue_position(), None);
    assert_eq!(opener.live_handles(), 0);
}

#[test]
fn open_without_position_picks_an_entry() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);

    engine
        .open(create_test_tracks(&["A", "B", "C", "D"]), None)
        .unwrap();

    assert!(engine.queue_position().is_some_and(|p| p < 4));
}

#[test]
fn enqueue_into_empty_queue_starts_playing() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);

    engine
        .enqueue(create_test_tracks(&["A", "B"]), EnqueueAction::Last)
        .unwrap();

    assert_eq!(engine.queue_position(), Some(0));
    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("A")));
}

#[test]
fn enqueue_next_inserts_after_current() {
    let (engine, opener) = playing_engine(&["A", "B", "C"], 0);

    engine
        .enqueue(create_test_tracks(&["X"]), EnqueueAction::Next)
        .unwrap();

    assert_eq!(engine.queue(), create_test_tracks(&["A", "X", "B", "C"]));
    assert_eq!(engine.queue_position(), Some(0));
    assert_eq!(opener.open_calls().last(), Some(&uri("X")));
}

#[test]
fn enqueue_next_at_end_appends() {
    let (engine, _opener) = playing_engine(&["A", "B"], 1);

    engine
        .enqueue(create_test_tracks(&["X"]), EnqueueAction::Next)
        .unwrap();

    assert_eq!(engine.queue(), create_test_tracks(&["A", "B", "X"]));
    assert_eq!(engine.queue_position(), Some(1));
}

#[test]
fn enqueue_now_plays_first_new_entry() {
    let (engine, opener) = playing_engine(&["A", "B"], 0);

    engine
        .enqueue(create_test_tracks(&["X", "Y"]), EnqueueAction::Now)
        .unwrap();

    assert_eq!(engine.queue().len(), 4);
    assert_eq!(engine.queue_position(), Some(2));
    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("X")));
}

// ===== Navigation =====

#[test]
fn repeat_all_wraps_sequentially() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine
        .open(create_test_tracks(&["A", "B", "C"]), Some(0))
        .unwrap();
    engine.set_repeat_mode(RepeatMode::All).unwrap();

    let mut visited = Vec::new();
    for _ in 0..3 {
        engine.next(false).unwrap();
        visited.push(engine.queue_position().unwrap());
    }

    assert_eq!(visited, vec![1, 2, 0]);
}

#[test]
fn next_on_empty_queue_does_nothing() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);

    engine.next(true).unwrap();

    assert_eq!(engine.queue_position(), None);
    assert!(drain(&rx).is_empty());
}

#[test]
fn prev_wraps_to_last_entry() {
    let (engine, opener) = playing_engine(&["A", "B", "C"], 0);

    engine.prev().unwrap();

    assert_eq!(engine.queue_position(), Some(2));
    assert_eq!(opener.playing_uri(), Some(uri("C")));
}

#[test]
fn play_near_end_skips_to_next_entry() {
    let (engine, opener) = playing_engine(&["A", "B"], 0);
    opener.set_playing_position(Duration::from_secs(179));
    engine.pause().unwrap();

    engine.play().unwrap();

    assert_eq!(engine.queue_position(), Some(1));
    assert!(engine.is_playing());
}

#[test]
fn play_near_end_with_unopenable_next_stays_stopped() {
    let opener = MockOpener::new();
    opener.fail("B");
    let (engine, _rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    engine.play().unwrap();
    opener.set_playing_position(Duration::from_secs(179));
    engine.pause().unwrap();

    engine.play().unwrap();

    assert!(!engine.is_playing());
    assert_eq!(engine.duration(), None);
    assert_eq!(opener.playing_uri(), None);
}

#[test]
fn normal_shuffle_visits_every_entry_once() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine
        .open(create_test_tracks(&["A", "B", "C", "D", "E"]), Some(0))
        .unwrap();
    engine.set_shuffle_mode(ShuffleMode::Normal).unwrap();
    engine.play().unwrap();

    let mut visited = vec![0];
    for _ in 0..4 {
        engine.next(false).unwrap();
        let position = engine.queue_position().unwrap();
        assert!(!visited.contains(&position), "{position} visited twice");
        visited.push(position);
    }
    assert!(engine.is_playing());

    engine.next(false).unwrap();
    assert!(!engine.is_playing());
}

// ===== Queue edits =====

#[test]
fn removing_current_entry_reopens_and_keeps_playing() {
    let (engine, opener) = playing_engine(&["A", "B", "C"], 1);

    assert_eq!(engine.remove_range(1, 1).unwrap(), 1);

    assert_eq!(engine.queue(), create_test_tracks(&["A", "C"]));
    assert_eq!(engine.queue_position(), Some(1));
    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("C")));
}

#[test]
fn removing_everything_stops_playback() {
    let (engine, opener) = playing_engine(&["A", "B", "C"], 1);

    assert_eq!(engine.remove_range(0, 99).unwrap(), 3);

    assert!(engine.queue().is_empty());
    assert_eq!(engine.queue_position(), None);
    assert!(!engine.is_playing());
    assert_eq!(opener.live_handles(), 0);
}

#[test]
fn removing_before_current_keeps_current_track() {
    let (engine, _opener) = playing_engine(&["A", "B", "C", "D"], 3);

    assert_eq!(engine.remove_range(0, 1).unwrap(), 2);

    assert_eq!(engine.queue_position(), Some(1));
    assert_eq!(engine.now_playing().id(), Some("D"));
}

#[test]
fn remove_track_removes_every_occurrence() {
    let (engine, _opener) = playing_engine(&["A", "B", "A", "C"], 1);

    assert_eq!(engine.remove_track(create_test_track("A")).unwrap(), 2);

    assert_eq!(engine.queue(), create_test_tracks(&["B", "C"]));
    assert_eq!(engine.queue_position(), Some(0));
    assert_eq!(engine.remove_track(create_test_track("Z")).unwrap(), 0);
}

#[test]
fn moving_items_keeps_current_track() {
    let (engine, _opener) = playing_engine(&["A", "B", "C"], 0);

    engine.move_queue_item(0, 2).unwrap();

    assert_eq!(engine.queue(), create_test_tracks(&["B", "C", "A"]));
    assert_eq!(engine.queue_position(), Some(2));
    assert_eq!(engine.now_playing().id(), Some("A"));
}

// ===== Transitions =====

#[test]
fn completion_hands_off_to_prepared_next() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);
    engine
        .open(create_test_tracks(&["A", "B", "C"]), Some(0))
        .unwrap();
    engine.play().unwrap();
    assert!(opener.playing_has_next());
    drain(&rx);

    assert!(opener.complete_playing());
    engine.sync().unwrap();

    assert_eq!(engine.queue_position(), Some(1));
    assert_eq!(opener.playing_uri(), Some(uri("B")));
    assert!(engine.is_playing());
    assert!(changes(&drain(&rx)).contains(&Change::MetaChanged));
}

#[test]
fn completion_at_end_of_queue_stops() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(1)).unwrap();
    engine.play().unwrap();
    assert!(!opener.playing_has_next());
    drain(&rx);

    assert!(opener.complete_playing());
    engine.sync().unwrap();

    assert!(!engine.is_playing());
    assert_eq!(engine.queue_position(), Some(1));
    assert!(changes(&drain(&rx)).contains(&Change::PlayStateChanged));
}

#[test]
fn repeat_current_replays_same_entry() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    engine.set_repeat_mode(RepeatMode::Current).unwrap();
    engine.play().unwrap();

    assert!(opener.complete_playing());
    engine.sync().unwrap();

    assert_eq!(engine.queue_position(), Some(0));
    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("A")));
}

#[test]
fn player_error_on_current_moves_on() {
    let (engine, opener) = playing_engine(&["A", "B"], 0);

    assert!(opener.fail_playing(PlayerErrorKind::Other(1)));
    engine.sync().unwrap();

    assert_eq!(engine.queue_position(), Some(1));
    assert!(engine.is_playing());
}

#[test]
fn wake_lock_is_held_while_track_ends() {
    let opener = MockOpener::new();
    let wake_lock = CountingWakeLock::default();
    let (host, _rx) = test_host(&opener);
    let engine =
        PlaybackEngine::spawn(test_config(), host.with_wake_lock(wake_lock.clone())).unwrap();
    engine.open(create_test_tracks(&["A"]), Some(0)).unwrap();
    engine.play().unwrap();

    assert!(opener.complete_playing());

    assert!(wait_until(WAIT, || wake_lock.released.load(Ordering::SeqCst) == 1));
    assert_eq!(wake_lock.acquired.load(Ordering::SeqCst), 1);
    assert!(!engine.is_playing());
}

// ===== Failure recovery =====

#[test]
fn open_failures_halt_after_bounded_skips() {
    let opener = MockOpener::new();
    let ids: Vec<String> = (0..12).map(|i| format!("bad{i}")).collect();
    for id in &ids {
        opener.fail(id);
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let (engine, rx) = create_engine(&opener);

    engine.open(create_test_tracks(&id_refs), Some(0)).unwrap();

    assert_eq!(opener.open_count(), 11);
    assert_eq!(engine.queue_position(), Some(10));
    assert!(!engine.is_playing());
    assert_eq!(failures(&drain(&rx)), 1);

    // A second failing list ends idle as well
    for id in ["x", "y", "z"] {
        opener.fail(id);
    }
    engine
        .open(create_test_tracks(&["x", "y", "z"]), Some(0))
        .unwrap();
    assert!(!engine.is_playing());

    // And the engine still works afterwards
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    engine.play().unwrap();
    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("A")));
}

#[test]
fn failing_entry_is_skipped() {
    let opener = MockOpener::new();
    opener.fail("B");
    let (engine, rx) = create_engine(&opener);
    engine
        .open(create_test_tracks(&["A", "B", "C"]), Some(1))
        .unwrap();

    assert_eq!(engine.queue_position(), Some(2));
    assert_eq!(failures(&drain(&rx)), 0);
}

#[test]
fn failed_next_handle_is_dropped_and_current_keeps_playing() {
    let (engine, opener) = playing_engine(&["A", "B", "C"], 0);
    assert!(opener.playing_has_next());

    assert!(opener.fail_live("B", PlayerErrorKind::Other(1)));
    engine.sync().unwrap();

    assert!(engine.is_playing());
    assert_eq!(opener.playing_uri(), Some(uri("A")));
    assert!(!opener.playing_has_next());
    assert!(!opener.is_live("B"));

    // Completion without a registered next reopens the following entry
    assert!(opener.complete_playing());
    assert!(wait_until(WAIT, || opener.playing_uri() == Some(uri("B"))));
    assert_eq!(engine.queue_position(), Some(1));
}

#[test]
fn server_death_while_playing_advances() {
    let opener = MockOpener::new();
    let (host, rx) = test_host(&opener);
    let config = EngineConfig {
        server_died_retry_ms: 300,
        ..test_config()
    };
    let engine = PlaybackEngine::spawn(config, host).unwrap();
    engine
        .open(create_test_tracks(&["A", "B", "C"]), Some(0))
        .unwrap();
    engine.play().unwrap();
    drain(&rx);

    assert!(opener.fail_playing(PlayerErrorKind::ServerDied));
    engine.sync().unwrap();

    // Stopped while waiting to recover
    assert!(!engine.is_playing());
    assert_eq!(engine.duration(), None);
    assert_eq!(changes(&drain(&rx)), vec![Change::PlayStateChanged]);

    assert!(wait_until(WAIT, || engine.queue_position() == Some(1)
        && opener.playing_uri() == Some(uri("B"))));
    assert!(engine.is_playing());
}

#[test]
fn server_death_while_idle_reopens_same_entry() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    let opened = opener.open_count();

    assert!(opener.fail_live("A", PlayerErrorKind::ServerDied));

    assert!(wait_until(WAIT, || opener.open_count() > opened
        && opener.is_live("A")));
    assert_eq!(engine.queue_position(), Some(0));
    assert!(!engine.is_playing());
}

// ===== Seek =====

#[test]
fn seek_clamps_to_duration() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A"]), Some(0)).unwrap();
    drain(&rx);

    let reached = engine.seek(Duration::from_secs(1_000)).unwrap();

    assert_eq!(reached, Some(TRACK_DURATION));
    assert_eq!(engine.position(), Some(TRACK_DURATION));
    assert_eq!(changes(&drain(&rx)), vec![Change::PositionChanged]);
}

#[test]
fn seek_without_source_returns_none() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);

    assert_eq!(engine.seek(Duration::from_secs(1)).unwrap(), None);
    assert_eq!(engine.position(), None);
}

// ===== Focus =====

#[test]
fn transient_focus_loss_pauses_and_gain_resumes() {
    let (engine, opener) = playing_engine(&["A", "B"], 0);

    engine.focus_changed(FocusChange::LossTransient).unwrap();
    engine.sync().unwrap();
    assert!(!engine.is_playing());
    assert_eq!(opener.playing_uri(), None);

    engine.focus_changed(FocusChange::Gain).unwrap();
    engine.sync().unwrap();
    assert!(engine.is_playing());
    assert!(wait_until(WAIT, || engine.volume() > 0.99));
    assert!(opener.playing_volume().is_some_and(|v| v > 0.99));
}

#[test]
fn permanent_focus_loss_does_not_resume() {
    let (engine, _opener) = playing_engine(&["A", "B"], 0);

    engine.focus_changed(FocusChange::Loss).unwrap();
    engine.sync().unwrap();
    assert!(!engine.is_playing());

    engine.focus_changed(FocusChange::Gain).unwrap();
    engine.sync().unwrap();
    assert!(!engine.is_playing());
}

#[test]
fn ducking_lowers_volume_without_pausing() {
    let (engine, _opener) = playing_engine(&["A", "B"], 0);

    engine
        .focus_changed(FocusChange::LossTransientCanDuck)
        .unwrap();
    assert!(wait_until(WAIT, || (engine.volume() - 0.2).abs() < 1e-3));
    assert!(engine.is_playing());

    engine.focus_changed(FocusChange::Gain).unwrap();
    assert!(wait_until(WAIT, || engine.volume() > 0.99));
}

// ===== Shuffle modes =====

#[test]
fn play_on_empty_queue_starts_auto_shuffle() {
    let opener = MockOpener::new();
    let (host, _rx) = test_host(&opener);
    let engine = PlaybackEngine::spawn(test_config(), host.with_catalog(catalog(30))).unwrap();

    engine.play().unwrap();

    assert_eq!(engine.shuffle_mode(), ShuffleMode::Auto);
    assert_eq!(engine.queue().len(), 1 + 7);
    assert_eq!(engine.queue_position(), Some(0));
    assert!(engine.is_playing());
}

#[test]
fn auto_shuffle_keeps_window_filled() {
    let opener = MockOpener::new();
    let (host, _rx) = test_host(&opener);
    let engine = PlaybackEngine::spawn(test_config(), host.with_catalog(catalog(30))).unwrap();
    engine.set_shuffle_mode(ShuffleMode::Auto).unwrap();

    for _ in 0..15 {
        engine.next(true).unwrap();
    }

    let position = engine.queue_position().unwrap();
    let queue = engine.queue();
    assert!(position <= 10);
    assert!(queue.len() - position - 1 >= 7);
}

#[test]
fn auto_shuffle_without_catalog_falls_back_to_none() {
    let opener = MockOpener::new();
    let (engine, rx) = create_engine(&opener);

    engine.set_shuffle_mode(ShuffleMode::Auto).unwrap();

    assert_eq!(engine.shuffle_mode(), ShuffleMode::None);
    assert!(changes(&drain(&rx)).contains(&Change::ShuffleModeChanged));
}

#[test]
fn open_leaves_auto_shuffle_for_normal() {
    let opener = MockOpener::new();
    let (host, _rx) = test_host(&opener);
    let engine = PlaybackEngine::spawn(test_config(), host.with_catalog(catalog(30))).unwrap();
    engine.set_shuffle_mode(ShuffleMode::Auto).unwrap();

    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();

    assert_eq!(engine.shuffle_mode(), ShuffleMode::Normal);
    assert_eq!(engine.queue(), create_test_tracks(&["A", "B"]));
}

// ===== Idle =====

fn idle_config(idle_delay_ms: u64) -> EngineConfig {
    EngineConfig {
        idle_delay_ms,
        ..test_config()
    }
}

fn saw_idle(events: &[EngineEvent]) -> bool {
    events.iter().any(|e| matches!(e, EngineEvent::Idle))
}

#[test]
fn idle_event_fires_without_client() {
    let opener = MockOpener::new();
    let (host, rx) = test_host(&opener);
    let _engine = PlaybackEngine::spawn(idle_config(50), host).unwrap();

    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event, EngineEvent::Idle);
}

#[test]
fn attached_client_suppresses_idle() {
    let opener = MockOpener::new();
    let (host, rx) = test_host(&opener);
    let engine = PlaybackEngine::spawn(idle_config(300), host).unwrap();
    engine.attach_client().unwrap();

    thread::sleep(Duration::from_millis(600));
    assert!(!saw_idle(&drain(&rx)));

    engine.detach_client().unwrap();
    assert!(wait_until(WAIT, || saw_idle(&drain(&rx))));
}

#[test]
fn idle_is_not_reported_while_playing() {
    let opener = MockOpener::new();
    let (host, rx) = test_host(&opener);
    let engine = PlaybackEngine::spawn(idle_config(50), host).unwrap();
    engine.open(create_test_tracks(&["A"]), Some(0)).unwrap();
    engine.play().unwrap();
    drain(&rx);

    thread::sleep(Duration::from_millis(300));
    assert!(!saw_idle(&drain(&rx)));
}

// ===== Lifecycle =====

#[test]
fn shutdown_releases_handles() {
    let opener = MockOpener::new();
    let (engine, _rx) = create_engine(&opener);
    engine.open(create_test_tracks(&["A", "B"]), Some(0)).unwrap();
    assert_eq!(opener.live_handles(), 2);

    engine.shutdown().unwrap();

    assert_eq!(opener.live_handles(), 0);
}
