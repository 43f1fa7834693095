use anyhow::Result;
use std::fmt;
use tokio::sync::oneshot;

use crate::engine::PlayerNotice;

/// User intents fed into the controller loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    ToggleRecord,
    PlayPause,
    Stop,
    /// Fraction of the track, `0.0..=1.0`
    Seek(f64),
    SetLooping(bool),
    Shutdown,
}

/// Which side currently owns the shared resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Recording,
}

/// Identifies one incarnation of a player or recorder handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Results posted back to the controller loop by spawned engine operations
/// and by player notifications.
#[derive(Debug)]
pub enum Completion {
    Prepared {
        generation: Generation,
        result: Result<()>,
    },
    PlayPause {
        generation: Generation,
        result: Result<bool>,
    },
    Stopped {
        generation: Generation,
        result: Result<()>,
    },
    Seeked {
        generation: Generation,
        result: Result<()>,
    },
    Notice {
        generation: Generation,
        notice: PlayerNotice,
    },
    Permission {
        generation: Generation,
        granted: bool,
    },
    RecordToggled {
        generation: Generation,
        result: Result<bool>,
    },
}

impl Completion {
    /// Notices arrive unsolicited; everything else answers a spawned operation.
    pub fn is_operation(&self) -> bool {
        !matches!(self, Completion::Notice { .. })
    }
}

/// Commands for the capture actor behind a recorder handle
pub enum RecorderCommand {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Shutdown,
}
