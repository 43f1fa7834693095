use std::fmt;
use thiserror::Error;

/// Transport operations that can fail on a prepared player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    PlayPause,
    Stop,
    Seek,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportOp::PlayPause => "Play/pause",
            TransportOp::Stop => "Stop",
            TransportOp::Seek => "Seek",
        };
        f.write_str(name)
    }
}

/// Failures surfaced to the user through `ViewModel::last_error`
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to prepare player: {0:#}")]
    Prepare(anyhow::Error),

    #[error("{op} failed: {cause:#}")]
    Transport {
        op: TransportOp,
        cause: anyhow::Error,
    },

    #[error("Failed to toggle recording: {0:#}")]
    RecordToggle(anyhow::Error),

    #[error("Record Audio Permission was denied")]
    PermissionDenied,
}
