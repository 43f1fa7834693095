//! Derives the UI-facing view model from the current handle state.

use serde::Serialize;
use std::fmt;

use crate::engine::PlayerStatus;

pub const LABEL_PREPARING: &str = "Preparing...";
pub const LABEL_PLAY: &str = "Play";
pub const LABEL_PAUSE: &str = "Pause";
pub const LABEL_RECORD: &str = "Record";
pub const LABEL_STOP: &str = "Stop";

/// What the reconciler reads. `None` means the handle is not bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub player: Option<PlayerStatus>,
    /// `Some(is_recording)` when a recorder is bound
    pub recorder: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub play_pause_label: &'static str,
    pub record_label: &'static str,
    pub stop_enabled: bool,
    pub play_enabled: bool,
    pub record_enabled: bool,
}

pub fn derive(snapshot: &Snapshot) -> Controls {
    let player = snapshot.player.as_ref();
    let recording = snapshot.recorder.unwrap_or(false);

    Controls {
        play_pause_label: if player.is_some_and(|p| p.is_playing) {
            LABEL_PAUSE
        } else {
            LABEL_PLAY
        },
        record_label: if recording { LABEL_STOP } else { LABEL_RECORD },
        stop_enabled: player.is_some_and(|p| p.can_stop),
        play_enabled: player.is_some_and(|p| p.can_play) && !recording,
        record_enabled: snapshot.recorder.is_some() && player.is_none_or(|p| p.is_stopped),
    }
}

/// Everything the front end renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub play_pause_label: &'static str,
    pub record_label: &'static str,
    pub stop_enabled: bool,
    pub play_enabled: bool,
    pub record_enabled: bool,
    pub loop_enabled: bool,
    pub progress: f64,
    pub last_error: Option<String>,
}

impl ViewModel {
    pub fn apply(&mut self, controls: Controls) {
        self.play_pause_label = controls.play_pause_label;
        self.record_label = controls.record_label;
        self.stop_enabled = controls.stop_enabled;
        self.play_enabled = controls.play_enabled;
        self.record_enabled = controls.record_enabled;
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self {
            play_pause_label: LABEL_PREPARING,
            record_label: LABEL_PREPARING,
            stop_enabled: false,
            play_enabled: false,
            record_enabled: false,
            loop_enabled: false,
            progress: 0.0,
            last_error: None,
        }
    }
}

impl fmt::Display for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn control(f: &mut fmt::Formatter<'_>, label: &str, enabled: bool) -> fmt::Result {
            if enabled {
                write!(f, "[{label}]")
            } else {
                write!(f, "({label})")
            }
        }

        control(f, self.record_label, self.record_enabled)?;
        f.write_str(" ")?;
        control(f, self.play_pause_label, self.play_enabled)?;
        f.write_str(" ")?;
        control(f, "Stop", self.stop_enabled)?;
        write!(
            f,
            " loop:{} {:>3.0}%",
            if self.loop_enabled { "on" } else { "off" },
            self.progress * 100.0
        )?;
        if let Some(error) = &self.last_error {
            write!(f, "  error: {error}")?;
        }
        Ok(())
    }
}
