//! Owning context for the player and recorder bound to one resource.
//!
//! Every engine call runs as a local task; its result comes back through the
//! completion channel and is applied on the controller loop. Each completion
//! carries the generation of the handle it was issued against and is dropped
//! if that handle has since been replaced.

mod playback;
mod recording;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::engine::{AudioPlayer, AudioRecorder, PlayerFactory, RecorderFactory};
use crate::error::ControlError;
use crate::messages::{Completion, Generation, Intent, Phase};
use crate::permission::PermissionService;
use crate::progress::SeekCooldown;
use crate::reconcile::{self, Snapshot, ViewModel};

/// One handle slot. The generation advances whenever the handle is released
/// or replaced.
struct Slot<T: ?Sized> {
    handle: Option<Rc<T>>,
    generation: Generation,
}

impl<T: ?Sized> Slot<T> {
    fn empty() -> Self {
        Self {
            handle: None,
            generation: Generation::default(),
        }
    }

    fn release(&mut self) -> Option<Rc<T>> {
        self.generation = self.generation.next();
        self.handle.take()
    }

    /// Reserve the generation the next handle will be installed under.
    fn advance(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn install(&mut self, handle: Rc<T>) {
        self.handle = Some(handle);
    }

    fn current(&self) -> Option<(Generation, Rc<T>)> {
        self.handle
            .as_ref()
            .map(|handle| (self.generation, Rc::clone(handle)))
    }

    fn get(&self) -> Option<&T> {
        self.handle.as_deref()
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.handle.is_some() && self.generation == generation
    }
}

/// Engines and timing the controller is built from
pub struct ControllerParts {
    pub resource: PathBuf,
    pub players: Rc<dyn PlayerFactory>,
    pub recorders: Rc<dyn RecorderFactory>,
    pub permissions: Rc<dyn PermissionService>,
    pub progress_interval: Duration,
    pub seek_debounce: Duration,
    pub looping: bool,
}

pub struct Controller {
    resource: PathBuf,
    players: Rc<dyn PlayerFactory>,
    recorders: Rc<dyn RecorderFactory>,
    permissions: Rc<dyn PermissionService>,
    player: Slot<dyn AudioPlayer>,
    recorder: Slot<dyn AudioRecorder>,
    phase: Phase,
    looping: bool,
    cooldown: SeekCooldown,
    progress_interval: Duration,
    view: watch::Sender<ViewModel>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl Controller {
    pub fn new(parts: ControllerParts, view: watch::Sender<ViewModel>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        view.send_modify(|vm| vm.loop_enabled = parts.looping);

        Self {
            resource: parts.resource,
            players: parts.players,
            recorders: parts.recorders,
            permissions: parts.permissions,
            player: Slot::empty(),
            recorder: Slot::empty(),
            phase: Phase::Idle,
            looping: parts.looping,
            cooldown: SeekCooldown::new(parts.seek_debounce),
            progress_interval: parts.progress_interval,
            view,
            completion_tx,
            completion_rx,
            in_flight: 0,
        }
    }

    /// Bind the initial player and recorder. Must run inside a `LocalSet`.
    pub fn initialize(&mut self) {
        self.reload_player();
        self.reload_recorder();
    }

    /// Drive the controller until `Intent::Shutdown` or the intent channel
    /// closes, then tear everything down.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) {
        self.initialize();

        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(Intent::Shutdown) | None => break,
                    Some(intent) => self.handle_intent(intent),
                },

                Some(completion) = self.completion_rx.recv() => {
                    self.apply(completion);
                }

                now = ticker.tick() => {
                    self.sample_progress(now);
                }
            }
        }

        drop(ticker);
        self.teardown();
    }

    /// Disabled controls swallow input, like greyed-out buttons.
    pub fn handle_intent(&mut self, intent: Intent) {
        tracing::debug!("Intent {:?} in phase {:?}", intent, self.phase);
        let view = self.view.borrow().clone();

        match intent {
            Intent::ToggleRecord if view.record_enabled => self.toggle_record(),
            Intent::PlayPause if view.play_enabled && self.phase == Phase::Idle => {
                self.play_pause()
            }
            Intent::Stop if view.stop_enabled => self.stop(),
            Intent::Seek(fraction) => self.seek(fraction),
            Intent::SetLooping(enabled) => self.set_looping(enabled),
            // Only the run loop may tear down
            Intent::Shutdown => tracing::debug!("Shutdown is handled by the run loop"),
            disabled => tracing::warn!("Ignoring {:?}: control is disabled", disabled),
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn spawn_op<F>(&mut self, op: F)
    where
        F: Future<Output = Completion> + 'static,
    {
        self.in_flight += 1;
        let tx = self.completion_tx.clone();
        tokio::task::spawn_local(async move {
            let completion = op.await;
            // Only fails once the controller is gone
            let _ = tx.send(completion);
        });
    }

    fn apply(&mut self, completion: Completion) {
        if completion.is_operation() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        match completion {
            Completion::Prepared { generation, result } => self.on_prepared(generation, result),
            Completion::PlayPause { generation, result } => {
                self.on_play_pause(generation, result)
            }
            Completion::Stopped { generation, result } => self.on_stopped(generation, result),
            Completion::Seeked { generation, result } => self.on_seeked(generation, result),
            Completion::Notice { generation, notice } => self.on_notice(generation, notice),
            Completion::Permission {
                generation,
                granted,
            } => self.on_permission(generation, granted),
            Completion::RecordToggled { generation, result } => {
                self.on_record_toggled(generation, result)
            }
        }
    }

    /// Read the current handle state into the view model.
    fn reconcile(&mut self) {
        let snapshot = Snapshot {
            player: self.player.get().map(|player| player.status()),
            recorder: self.recorder.get().map(|recorder| recorder.is_recording()),
        };
        let controls = reconcile::derive(&snapshot);
        let looping = self.looping;
        self.view.send_modify(|vm| {
            vm.apply(controls);
            vm.loop_enabled = looping;
        });
    }

    fn surface(&mut self, err: ControlError) {
        match &err {
            ControlError::PermissionDenied => tracing::warn!("{}", err),
            _ => tracing::error!("{}", err),
        }
        let message = err.to_string();
        self.view.send_modify(|vm| vm.last_error = Some(message));
    }

    fn teardown(&mut self) {
        self.destroy_player();
        if let Some(recorder) = self.recorder.release() {
            recorder.destroy();
        }
        self.phase = Phase::Idle;
        tracing::info!("Controller torn down, {} operation(s) still in flight", self.in_flight);
    }

    /// Apply completions until nothing is in flight or queued.
    #[cfg(test)]
    async fn settle(&mut self) {
        loop {
            let completion = if self.in_flight > 0 {
                self.completion_rx.recv().await
            } else {
                self.completion_rx.try_recv().ok()
            };
            match completion {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
    }
}
