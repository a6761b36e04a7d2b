/// Cadence - command-line host for the playback engine
use anyhow::{bail, Context};
use cadence_playback::persistence;
use cadence_playback::{
    Change, EngineConfig, EngineEvent, EngineHost, JsonFileStore, NowPlaying, PlaybackEngine,
    RepeatMode, ShuffleMode, TrackRef,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::unbounded;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod probe;

use probe::ProbeOpener;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Background playback engine host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play local files (dry run: files are probed, no audio is produced)
    Play(PlayArgs),
    /// Print the snapshot stored in a state file
    Inspect {
        /// State file written by `play`
        state: PathBuf,
        /// Card id the snapshot is checked against
        #[arg(long, default_value_t = 0)]
        card_id: i32,
    },
}

#[derive(Args)]
struct PlayArgs {
    /// Files to queue; resumes the saved queue when empty
    files: Vec<PathBuf>,

    /// State file for the persisted queue
    #[arg(short, long, default_value = "cadence-state.json")]
    state: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    repeat: Option<RepeatArg>,

    /// Shuffle the queue
    #[arg(long)]
    shuffle: bool,

    /// Clock speed of the dry-run player
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long, default_value_t = 0)]
    card_id: i32,
}

#[derive(Clone, Copy, ValueEnum)]
enum RepeatArg {
    None,
    Current,
    All,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::None => RepeatMode::None,
            RepeatArg::Current => RepeatMode::Current,
            RepeatArg::All => RepeatMode::All,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => play(args)?,
        Commands::Inspect { state, card_id } => inspect(&state, card_id)?,
    }

    Ok(())
}

/// Queue entry for a local file: the parent directory is the host
fn track_for(path: &Path) -> anyhow::Result<TrackRef> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    let id = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} is not a valid file name", path.display()))?;
    let host = path
        .parent()
        .and_then(|dir| dir.to_str())
        .unwrap_or_default();

    Ok(TrackRef::new(id, host))
}

fn describe(now_playing: &NowPlaying) -> String {
    let metadata = &now_playing.metadata;
    match (&metadata.artist, &metadata.title) {
        (Some(artist), Some(title)) => format!("{} - {}", artist, title),
        (None, Some(title)) => title.clone(),
        _ => now_playing
            .track
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

fn play(args: PlayArgs) -> anyhow::Result<()> {
    let config = EngineConfig::load(args.config.as_deref())?;
    let tracks = args
        .files
        .iter()
        .map(|path| track_for(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let store = JsonFileStore::open(&args.state)
        .with_context(|| format!("Failed to open state file {}", args.state.display()))?;

    let (tx, rx) = unbounded();
    let host = EngineHost::new(Arc::new(ProbeOpener::new(args.speed)))
        .with_store(store)
        .with_notifier(tx)
        .with_catalog(tracks.clone())
        .with_card_id(args.card_id);
    let engine = PlaybackEngine::spawn(config, host)?;
    // Stay resident until the queue ends
    engine.attach_client()?;

    if let Some(repeat) = args.repeat {
        engine.set_repeat_mode(repeat.into())?;
    }
    if args.shuffle {
        engine.set_shuffle_mode(ShuffleMode::Normal)?;
    }

    if !tracks.is_empty() {
        info!("Queueing {} files", tracks.len());
        engine.open(tracks, Some(0))?;
    } else if engine.queue().is_empty() {
        bail!(
            "Nothing to play: pass files or a state file with a saved queue ({})",
            args.state.display()
        );
    } else {
        info!(
            "Resuming saved queue of {} entries at {:?}",
            engine.queue().len(),
            engine.queue_position()
        );
    }

    engine.play()?;
    if engine.is_playing() {
        println!("Now playing: {}", describe(&engine.now_playing()));
        for event in rx.iter() {
            match event {
                EngineEvent::Changed {
                    change: Change::MetaChanged,
                    now_playing,
                } => println!("Now playing: {}", describe(&now_playing)),
                EngineEvent::Changed {
                    change: Change::PlayStateChanged,
                    now_playing,
                } if !now_playing.is_playing => {
                    info!("Playback finished");
                    break;
                }
                EngineEvent::Changed { change, .. } => debug!("{}", change.name()),
                EngineEvent::PlaybackFailed { track } => {
                    warn!("Playback failed at {:?}", track);
                    break;
                }
                EngineEvent::Idle => break,
            }
        }
    } else {
        warn!("Nothing could be played");
    }

    engine.shutdown()?;
    Ok(())
}

fn inspect(path: &Path, card_id: i32) -> anyhow::Result<()> {
    let store = JsonFileStore::open(path)
        .with_context(|| format!("Failed to open state file {}", path.display()))?;
    let snapshot = persistence::load(&store, card_id);

    let report = json!({
        "queue": snapshot.queue,
        "current": snapshot.current,
        "history": snapshot.history,
        "seek_position_ms": u64::try_from(snapshot.seek_position.as_millis()).unwrap_or(u64::MAX),
        "repeat_mode": snapshot.repeat_mode,
        "shuffle_mode": snapshot.shuffle_mode,
        "card_id": snapshot.card_id,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
