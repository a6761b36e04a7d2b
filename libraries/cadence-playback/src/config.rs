/// Engine configuration
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Maximum number of played indices remembered by shuffle history
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Consecutive open failures tolerated before playback halts
    #[serde(default = "default_max_open_failures")]
    pub max_open_failures: u32,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Delay before recovering from a fatal player error
    #[serde(default = "default_server_died_retry_ms")]
    pub server_died_retry_ms: u64,

    /// Delay before the idle timer fires with no client attached
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,

    /// Hard hold timeout passed to `WakeLock::acquire`
    #[serde(default = "default_wake_lock_timeout_ms")]
    pub wake_lock_timeout_ms: u64,

    #[serde(default = "default_wake_lock_release_delay_ms")]
    pub wake_lock_release_delay_ms: u64,

    /// `play()` within this distance of the end skips to the next track
    #[serde(default = "default_restart_threshold_ms")]
    pub restart_threshold_ms: u64,

    #[serde(default)]
    pub fade: FadeConfig,

    #[serde(default)]
    pub auto_shuffle: AutoShuffleConfig,
}

/// Volume ramps used by focus ducking and resume
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FadeConfig {
    #[serde(default = "default_duck_step")]
    pub duck_step: f32,

    #[serde(default = "default_duck_floor")]
    pub duck_floor: f32,

    #[serde(default = "default_fade_interval_ms")]
    pub down_interval_ms: u64,

    #[serde(default = "default_up_step")]
    pub up_step: f32,

    #[serde(default = "default_fade_interval_ms")]
    pub up_interval_ms: u64,
}

/// Party-shuffle window sizes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AutoShuffleConfig {
    /// Trim the head once more than this many entries precede the current one
    #[serde(default = "default_trim_threshold")]
    pub trim_threshold: usize,

    /// Played entries left before the current one after a trim
    #[serde(default = "default_keep_played")]
    pub keep_played: usize,

    /// Entries kept queued after the current one
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

impl EngineConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables use the `CADENCE__` prefix with `__` between
    /// nested keys, e.g. `CADENCE__FADE__DUCK_FLOOR=0.3`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .map_err(|e| PlaybackError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.history_size < 2 {
            return Err(PlaybackError::Config(
                "history_size must be at least 2".to_string(),
            ));
        }

        let fade = &self.fade;
        if !(0.0..=1.0).contains(&fade.duck_floor) {
            return Err(PlaybackError::Config(format!(
                "fade.duck_floor must be within [0, 1], got {}",
                fade.duck_floor
            )));
        }
        if fade.duck_step <= 0.0 || fade.up_step <= 0.0 {
            return Err(PlaybackError::Config(
                "fade steps must be positive".to_string(),
            ));
        }

        let window = &self.auto_shuffle;
        if window.lookahead == 0 {
            return Err(PlaybackError::Config(
                "auto_shuffle.lookahead must be at least 1".to_string(),
            ));
        }
        if window.keep_played > window.trim_threshold {
            return Err(PlaybackError::Config(format!(
                "auto_shuffle.keep_played ({}) exceeds trim_threshold ({})",
                window.keep_played, window.trim_threshold
            )));
        }

        Ok(())
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn server_died_retry(&self) -> Duration {
        Duration::from_millis(self.server_died_retry_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn wake_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_lock_timeout_ms)
    }

    pub fn wake_lock_release_delay(&self) -> Duration {
        Duration::from_millis(self.wake_lock_release_delay_ms)
    }

    pub fn restart_threshold(&self) -> Duration {
        Duration::from_millis(self.restart_threshold_ms)
    }
}

impl FadeConfig {
    pub fn down_interval(&self) -> Duration {
        Duration::from_millis(self.down_interval_ms)
    }

    pub fn up_interval(&self) -> Duration {
        Duration::from_millis(self.up_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            max_open_failures: default_max_open_failures(),
            open_timeout_ms: default_open_timeout_ms(),
            server_died_retry_ms: default_server_died_retry_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            wake_lock_timeout_ms: default_wake_lock_timeout_ms(),
            wake_lock_release_delay_ms: default_wake_lock_release_delay_ms(),
            restart_threshold_ms: default_restart_threshold_ms(),
            fade: FadeConfig::default(),
            auto_shuffle: AutoShuffleConfig::default(),
        }
    }
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            duck_step: default_duck_step(),
            duck_floor: default_duck_floor(),
            down_interval_ms: default_fade_interval_ms(),
            up_step: default_up_step(),
            up_interval_ms: default_fade_interval_ms(),
        }
    }
}

impl Default for AutoShuffleConfig {
    fn default() -> Self {
        Self {
            trim_threshold: default_trim_threshold(),
            keep_played: default_keep_played(),
            lookahead: default_lookahead(),
        }
    }
}

// Default values
fn default_history_size() -> usize {
    100
}

fn default_max_open_failures() -> u32 {
    10
}

fn default_open_timeout_ms() -> u64 {
    5_000
}

fn default_server_died_retry_ms() -> u64 {
    2_000
}

fn default_idle_delay_ms() -> u64 {
    60_000
}

fn default_wake_lock_timeout_ms() -> u64 {
    30_000
}

fn default_wake_lock_release_delay_ms() -> u64 {
    100
}

fn default_restart_threshold_ms() -> u64 {
    2_000
}

fn default_duck_step() -> f32 {
    0.05
}

fn default_duck_floor() -> f32 {
    0.2
}

fn default_up_step() -> f32 {
    0.01
}

fn default_fade_interval_ms() -> u64 {
    10
}

fn default_trim_threshold() -> usize {
    10
}

fn default_keep_played() -> usize {
    9
}

fn default_lookahead() -> usize {
    7
}
