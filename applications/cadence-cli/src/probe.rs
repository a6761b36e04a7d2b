//! Dry-run player backed by symphonia probing
//!
//! [`ProbeOpener`] probes each file with symphonia to learn its duration and
//! tags, then hands back a [`ClockHandle`]: a player that produces no audio
//! and reports completion when a wall-clock timer runs out.

use cadence_playback::{
    OpenError, PlayerErrorKind, PlayerEvents, PlayerHandle, SourceOpener, TrackMetadata,
};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::{debug, trace, warn};

/// Used when the container does not report a frame count
const FALLBACK_DURATION: Duration = Duration::from_secs(180);

/// Opens local files by probing them with symphonia
pub struct ProbeOpener {
    speed: f64,
}

impl ProbeOpener {
    /// `speed` scales the playback clock (2.0 finishes tracks twice as fast)
    pub fn new(speed: f64) -> Self {
        Self {
            speed: speed.max(0.01),
        }
    }
}

impl SourceOpener for ProbeOpener {
    fn open(&self, uri: &str, events: PlayerEvents) -> Result<Box<dyn PlayerHandle>, OpenError> {
        let path = Path::new(uri);
        let (duration, metadata) = probe(path)?;
        debug!(
            "Probed {} ({:.1}s) as handle {}",
            path.display(),
            duration.as_secs_f64(),
            events.id()
        );

        Ok(Box::new(ClockHandle::new(duration, metadata, events, self.speed)))
    }
}

/// Read duration and tags without decoding any audio
fn probe(path: &Path) -> Result<(Duration, TrackMetadata), OpenError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => OpenError::NotFound(path.display().to_string()),
        _ => OpenError::Io(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| OpenError::Unsupported(format!("{}: {}", path.display(), e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| OpenError::Unsupported(format!("{}: no audio track", path.display())))?;

    let params = &track.codec_params;
    let duration = match (params.time_base, params.n_frames) {
        (Some(time_base), Some(n_frames)) => {
            let time = time_base.calc_time(n_frames);
            Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac)
        }
        _ => FALLBACK_DURATION,
    };

    let mut metadata = TrackMetadata::default();
    if let Some(log) = probed.metadata.get() {
        if let Some(revision) = log.current() {
            read_tags(revision, &mut metadata);
        }
    }
    if let Some(revision) = probed.format.metadata().current() {
        read_tags(revision, &mut metadata);
    }
    if metadata.title.is_none() {
        metadata.title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
    }

    Ok((duration, metadata))
}

fn read_tags(revision: &MetadataRevision, metadata: &mut TrackMetadata) {
    for tag in revision.tags() {
        let value = tag.value.to_string();
        if value.is_empty() {
            continue;
        }
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => metadata.title = Some(value),
            Some(StandardTagKey::Artist) => metadata.artist = Some(value),
            Some(StandardTagKey::Album) => metadata.album = Some(value),
            _ => {}
        }
    }
}

/// Player handle that only keeps time
///
/// While started, a timer thread waits for the remaining duration and then
/// reports completion. Pausing, seeking or releasing disarms the timer by
/// dropping its cancel sender.
pub struct ClockHandle {
    duration: Duration,
    metadata: TrackMetadata,
    events: PlayerEvents,
    speed: f64,

    /// Position when the clock last stopped or was seeked
    offset: Duration,
    started_at: Option<Instant>,
    cancel: Option<Sender<()>>,
    volume: f32,
}

impl ClockHandle {
    fn new(duration: Duration, metadata: TrackMetadata, events: PlayerEvents, speed: f64) -> Self {
        Self {
            duration,
            metadata,
            events,
            speed,
            offset: Duration::ZERO,
            started_at: None,
            cancel: None,
            volume: 1.0,
        }
    }

    fn arm(&mut self) {
        let remaining = self
            .duration
            .saturating_sub(self.offset)
            .div_f64(self.speed);
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let events = self.events.clone();

        // Dropping `cancel` disconnects the channel and ends the wait early
        let spawned = thread::Builder::new()
            .name("cadence-clock".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(remaining) {
                    events.completed();
                }
            });

        match spawned {
            Ok(_) => self.cancel = Some(cancel_tx),
            Err(e) => {
                warn!("Failed to start clock for handle {}: {}", self.events.id(), e);
                self.events.error(PlayerErrorKind::Other(-1));
            }
        }
    }

    fn disarm(&mut self) {
        self.offset = self.position();
        self.started_at = None;
        self.cancel = None;
    }
}

impl PlayerHandle for ClockHandle {
    fn start(&mut self) {
        if self.started_at.is_some() {
            return;
        }
        trace!("Clock {} started at {:?}", self.events.id(), self.offset);
        self.started_at = Some(Instant::now());
        self.arm();
    }

    fn pause(&mut self) {
        self.disarm();
    }

    fn stop(&mut self) {
        self.disarm();
        self.offset = Duration::ZERO;
    }

    fn seek(&mut self, position: Duration) -> Duration {
        let playing = self.is_playing();
        self.disarm();
        self.offset = position.min(self.duration);
        if playing {
            self.start();
        }
        self.offset
    }

    fn position(&self) -> Duration {
        let elapsed = self
            .started_at
            .map(|at| at.elapsed().mul_f64(self.speed))
            .unwrap_or_default();
        (self.offset + elapsed).min(self.duration)
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_next(&mut self, _next: Option<&mut dyn PlayerHandle>) -> Result<(), OpenError> {
        // Nothing to chain: the engine starts the next handle on completion
        Ok(())
    }

    fn release(&mut self) {
        self.disarm();
    }

    fn metadata(&self) -> TrackMetadata {
        self.metadata.clone()
    }
}
