//! Audio focus arbitration and focus fades
//!
//! Maps platform focus changes to engine actions and owns the focus volume
//! that fade ticks ramp up and down.

use crate::config::FadeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Audio focus change reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChange {
    /// Another app took focus for good
    Loss,

    /// Focus lost briefly (e.g. a phone call)
    LossTransient,

    /// Focus lost briefly, but playing quietly is allowed
    LossTransientCanDuck,

    /// Focus came back
    Gain,
}

/// What the engine should do in response to a focus change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusAction {
    /// Pause playback
    Pause,

    /// Cancel any fade-up and start fading down now
    Duck,

    /// Resume from silence; `play()` starts the fade-up
    ResumeFromSilence,

    /// Cancel any fade-down and fade up from the current volume
    FadeUp,
}

/// Focus state machine
///
/// Volume is linear in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct FocusArbiter {
    volume: f32,
    paused_by_transient_loss: bool,
    config: FadeConfig,
}

impl FocusArbiter {
    pub fn new(config: FadeConfig) -> Self {
        Self {
            volume: 1.0,
            paused_by_transient_loss: false,
            config,
        }
    }

    /// Decide the action for `change` given whether the engine is playing
    pub fn on_focus_change(&mut self, change: FocusChange, is_playing: bool) -> FocusAction {
        debug!("Focus change {:?} (playing: {})", change, is_playing);
        match change {
            FocusChange::Loss => {
                self.paused_by_transient_loss = false;
                FocusAction::Pause
            }
            FocusChange::LossTransient => {
                if is_playing {
                    self.paused_by_transient_loss = true;
                }
                FocusAction::Pause
            }
            FocusChange::LossTransientCanDuck => FocusAction::Duck,
            FocusChange::Gain => {
                if !is_playing && self.paused_by_transient_loss {
                    self.paused_by_transient_loss = false;
                    self.volume = 0.0;
                    FocusAction::ResumeFromSilence
                } else {
                    FocusAction::FadeUp
                }
            }
        }
    }

    /// Apply one fade-down step; returns the delay to the next tick, if any
    pub fn fade_down_tick(&mut self) -> Option<Duration> {
        self.volume -= self.config.duck_step;
        if self.volume > self.config.duck_floor {
            Some(self.config.down_interval())
        } else {
            self.volume = self.config.duck_floor;
            None
        }
    }

    /// Apply one fade-up step; returns the delay to the next tick, if any
    pub fn fade_up_tick(&mut self) -> Option<Duration> {
        self.volume += self.config.up_step;
        if self.volume < 1.0 {
            Some(self.config.up_interval())
        } else {
            self.volume = 1.0;
            None
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_paused_by_transient_loss(&self) -> bool {
        self.paused_by_transient_loss
    }
}
