//! Capabilities the controller consumes from the audio engines.
//!
//! Handles are shared as `Rc<dyn ...>` because every operation runs as a
//! local task on the controller's `LocalSet`.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::messages::{Completion, Generation};

/// Point-in-time read of a player's transport flags and clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
    pub is_playing: bool,
    pub is_stopped: bool,
    pub can_play: bool,
    pub can_stop: bool,
    /// Milliseconds. Negative or NaN while the engine has no position.
    pub current_time_ms: f64,
    /// Milliseconds. Negative or NaN while unknown.
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerNotice {
    Ended,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOptions {
    pub auto_destroy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    pub bitrate: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub quality: Quality,
}

impl RecorderSettings {
    pub const STUDIO: Self = Self {
        bitrate: 256_000,
        channels: 2,
        sample_rate: 44_100,
        quality: Quality::Max,
    };
}

/// Lets a player report `ended`/`paused` back to the controller, stamped with
/// the generation the player was built for.
#[derive(Clone)]
pub struct NoticeSender {
    generation: Generation,
    tx: mpsc::UnboundedSender<Completion>,
}

impl NoticeSender {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self { generation, tx }
    }

    pub fn send(&self, notice: PlayerNotice) {
        let completion = Completion::Notice {
            generation: self.generation,
            notice,
        };
        if self.tx.send(completion).is_err() {
            tracing::debug!("Controller gone, dropping {:?} notice", notice);
        }
    }
}

#[async_trait(?Send)]
pub trait AudioPlayer {
    async fn prepare(&self) -> Result<()>;

    /// Toggle between playing and paused. Resolves to `true` when the player
    /// ended up paused.
    async fn play_pause(&self) -> Result<bool>;

    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position: Duration) -> Result<()>;

    fn set_looping(&self, looping: bool);

    fn status(&self) -> PlayerStatus;

    fn destroy(&self);
}

#[async_trait(?Send)]
pub trait AudioRecorder {
    /// Start or stop recording. Resolves to `true` when this call stopped a
    /// recording in progress.
    async fn toggle_record(&self) -> Result<bool>;

    fn is_recording(&self) -> bool;

    fn destroy(&self);
}

pub trait PlayerFactory {
    fn create(
        &self,
        resource: &Path,
        options: PlayerOptions,
        notices: NoticeSender,
    ) -> Rc<dyn AudioPlayer>;
}

pub trait RecorderFactory {
    fn create(&self, resource: &Path, settings: RecorderSettings) -> Rc<dyn AudioRecorder>;
}
