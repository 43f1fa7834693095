use super::*;
use anyhow::Result;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use tokio::task::LocalSet;
use tokio::time::Instant;

use crate::engine::{
    NoticeSender, PlayerNotice, PlayerOptions, PlayerStatus, RecorderSettings,
};
use crate::permission::{Capability, PermissionPrompt, PreGranted};
use crate::reconcile::{LABEL_PAUSE, LABEL_PLAY, LABEL_RECORD, LABEL_STOP};

struct FakePlayer {
    options: PlayerOptions,
    notices: NoticeSender,
    prepare_error: Option<String>,
    duration_ms: f64,
    prepared: Cell<bool>,
    playing: Cell<bool>,
    stopped: Cell<bool>,
    looping: Cell<bool>,
    looping_writes: Cell<usize>,
    destroyed: Cell<bool>,
    current_ms: Cell<f64>,
    fail_transport: Cell<bool>,
    seeks: RefCell<Vec<Duration>>,
}

#[async_trait(?Send)]
impl AudioPlayer for FakePlayer {
    async fn prepare(&self) -> Result<()> {
        if let Some(message) = &self.prepare_error {
            anyhow::bail!("{message}");
        }
        self.prepared.set(true);
        Ok(())
    }

    async fn play_pause(&self) -> Result<bool> {
        if self.fail_transport.get() {
            anyhow::bail!("output device unavailable");
        }
        if self.playing.get() {
            self.playing.set(false);
            self.notices.send(PlayerNotice::Paused);
            Ok(true)
        } else {
            self.playing.set(true);
            self.stopped.set(false);
            Ok(false)
        }
    }

    async fn stop(&self) -> Result<()> {
        self.playing.set(false);
        self.stopped.set(true);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.seeks.borrow_mut().push(position);
        Ok(())
    }

    fn set_looping(&self, looping: bool) {
        self.looping.set(looping);
        self.looping_writes.set(self.looping_writes.get() + 1);
    }

    fn status(&self) -> PlayerStatus {
        PlayerStatus {
            is_playing: self.playing.get(),
            is_stopped: self.stopped.get(),
            can_play: self.prepared.get() && !self.destroyed.get(),
            can_stop: self.prepared.get() && !self.stopped.get(),
            current_time_ms: self.current_ms.get(),
            duration_ms: self.duration_ms,
        }
    }

    fn destroy(&self) {
        self.destroyed.set(true);
        self.playing.set(false);
    }
}

struct FakePlayers {
    created: RefCell<Vec<Rc<FakePlayer>>>,
    prepare_errors: RefCell<VecDeque<Option<String>>>,
    duration_ms: Cell<f64>,
}

impl FakePlayers {
    fn new() -> Self {
        Self {
            created: RefCell::new(Vec::new()),
            prepare_errors: RefCell::new(VecDeque::new()),
            duration_ms: Cell::new(10_000.0),
        }
    }

    fn count(&self) -> usize {
        self.created.borrow().len()
    }

    fn nth(&self, index: usize) -> Rc<FakePlayer> {
        Rc::clone(&self.created.borrow()[index])
    }

    fn latest(&self) -> Rc<FakePlayer> {
        self.nth(self.count() - 1)
    }
}

impl PlayerFactory for FakePlayers {
    fn create(
        &self,
        _resource: &Path,
        options: PlayerOptions,
        notices: NoticeSender,
    ) -> Rc<dyn AudioPlayer> {
        let player = Rc::new(FakePlayer {
            options,
            notices,
            prepare_error: self.prepare_errors.borrow_mut().pop_front().flatten(),
            duration_ms: self.duration_ms.get(),
            prepared: Cell::new(false),
            playing: Cell::new(false),
            stopped: Cell::new(true),
            looping: Cell::new(false),
            looping_writes: Cell::new(0),
            destroyed: Cell::new(false),
            current_ms: Cell::new(0.0),
            fail_transport: Cell::new(false),
            seeks: RefCell::new(Vec::new()),
        });
        self.created.borrow_mut().push(Rc::clone(&player));
        player
    }
}

struct FakeRecorder {
    settings: RecorderSettings,
    recording: Cell<bool>,
    toggles: Cell<usize>,
    destroyed: Cell<bool>,
    fail: Cell<bool>,
}

#[async_trait(?Send)]
impl AudioRecorder for FakeRecorder {
    async fn toggle_record(&self) -> Result<bool> {
        self.toggles.set(self.toggles.get() + 1);
        if self.fail.get() {
            anyhow::bail!("microphone busy");
        }
        let was_recording = self.recording.get();
        self.recording.set(!was_recording);
        Ok(was_recording)
    }

    fn is_recording(&self) -> bool {
        self.recording.get()
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

#[derive(Default)]
struct FakeRecorders {
    created: RefCell<Vec<Rc<FakeRecorder>>>,
}

impl FakeRecorders {
    fn count(&self) -> usize {
        self.created.borrow().len()
    }

    fn nth(&self, index: usize) -> Rc<FakeRecorder> {
        Rc::clone(&self.created.borrow()[index])
    }

    fn latest(&self) -> Rc<FakeRecorder> {
        self.nth(self.count() - 1)
    }
}

impl RecorderFactory for FakeRecorders {
    fn create(&self, _resource: &Path, settings: RecorderSettings) -> Rc<dyn AudioRecorder> {
        let recorder = Rc::new(FakeRecorder {
            settings,
            recording: Cell::new(false),
            toggles: Cell::new(0),
            destroyed: Cell::new(false),
            fail: Cell::new(false),
        });
        self.created.borrow_mut().push(Rc::clone(&recorder));
        recorder
    }
}

/// A platform that always asks, answering with a canned result
struct Gate {
    answer: std::result::Result<bool, &'static str>,
    requests: Cell<usize>,
}

impl Gate {
    fn answering(answer: std::result::Result<bool, &'static str>) -> Rc<Self> {
        Rc::new(Self {
            answer,
            requests: Cell::new(0),
        })
    }
}

#[async_trait(?Send)]
impl PermissionService for Gate {
    fn requires_explicit_grant(&self) -> bool {
        true
    }

    async fn request(&self, capability: Capability, prompt: &PermissionPrompt) -> Result<bool> {
        assert_eq!(capability, Capability::RecordAudio);
        assert_eq!(prompt.title, "Microphone Permission");
        self.requests.set(self.requests.get() + 1);
        self.answer.map_err(|e| anyhow::anyhow!(e))
    }
}

struct Rig {
    controller: Controller,
    view: watch::Receiver<ViewModel>,
    players: Rc<FakePlayers>,
    recorders: Rc<FakeRecorders>,
}

impl Rig {
    fn new(permissions: Rc<dyn PermissionService>) -> Self {
        let players = Rc::new(FakePlayers::new());
        let recorders = Rc::new(FakeRecorders::default());
        let (view_tx, view) = watch::channel(ViewModel::default());
        let controller = Controller::new(
            ControllerParts {
                resource: PathBuf::from("take.wav"),
                players: players.clone(),
                recorders: recorders.clone(),
                permissions,
                progress_interval: Duration::from_millis(100),
                seek_debounce: Duration::from_millis(200),
                looping: false,
            },
            view_tx,
        );

        Self {
            controller,
            view,
            players,
            recorders,
        }
    }

    async fn ready(permissions: Rc<dyn PermissionService>) -> Self {
        let mut rig = Self::new(permissions);
        rig.controller.initialize();
        rig.controller.settle().await;
        rig
    }

    fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }
}

async fn local<F: Future>(f: F) -> F::Output {
    LocalSet::new().run_until(f).await
}

#[tokio::test]
async fn test_initialize_binds_and_prepares() {
    local(async {
        let rig = Rig::ready(Rc::new(PreGranted)).await;
        let view = rig.view();

        assert_eq!(view.play_pause_label, LABEL_PLAY);
        assert_eq!(view.record_label, LABEL_RECORD);
        assert!(view.play_enabled);
        assert!(view.record_enabled);
        assert!(!view.stop_enabled);
        assert_eq!(view.last_error, None);

        assert_eq!(rig.players.count(), 1);
        assert_eq!(rig.recorders.count(), 1);
        let player = rig.players.latest();
        assert!(!player.options.auto_destroy);
        assert_eq!(player.looping_writes.get(), 1);
        assert_eq!(rig.recorders.latest().settings, RecorderSettings::STUDIO);
        assert_eq!(rig.controller.phase(), Phase::Idle);
    })
    .await;
}

#[tokio::test]
async fn test_prepare_failure_surfaces_error() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.players
            .prepare_errors
            .borrow_mut()
            .push_back(Some("take.wav not found".into()));
        rig.controller.initialize();
        rig.controller.settle().await;

        let view = rig.view();
        assert_eq!(
            view.last_error.as_deref(),
            Some("Failed to prepare player: take.wav not found")
        );
        assert!(!view.play_enabled);
        assert_eq!(rig.players.latest().looping_writes.get(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_looping_preference_survives_reload() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.controller.set_looping(true);
        assert!(rig.view().loop_enabled);
        assert_eq!(rig.players.count(), 0);

        rig.controller.reload_player();
        rig.controller.settle().await;
        assert!(rig.players.latest().looping.get());
        assert!(rig.view().loop_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_set_looping_applies_to_bound_player() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        rig.controller.set_looping(true);
        assert!(rig.players.latest().looping.get());
        rig.controller.set_looping(false);
        assert!(!rig.players.latest().looping.get());
        assert!(!rig.view().loop_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_play_pause_round_trip() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;

        rig.controller.play_pause();
        rig.controller.settle().await;
        let view = rig.view();
        assert_eq!(view.play_pause_label, LABEL_PAUSE);
        assert!(view.stop_enabled);
        assert!(!view.record_enabled);

        rig.controller.play_pause();
        rig.controller.settle().await;
        assert_eq!(rig.view().play_pause_label, LABEL_PLAY);

        rig.controller.stop();
        rig.controller.settle().await;
        let view = rig.view();
        assert!(!view.stop_enabled);
        assert!(view.record_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_play_pause_failure_sets_error() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        rig.players.latest().fail_transport.set(true);

        rig.controller.play_pause();
        rig.controller.settle().await;

        let view = rig.view();
        assert_eq!(
            view.last_error.as_deref(),
            Some("Play/pause failed: output device unavailable")
        );
        assert_eq!(view.play_pause_label, LABEL_PLAY);
    })
    .await;
}

#[tokio::test]
async fn test_start_recording_without_stop() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;

        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert!(rig.players.nth(0).destroyed.get());
        assert_eq!(rig.recorders.latest().toggles.get(), 1);
        assert_eq!(rig.players.count(), 1);
        assert_eq!(rig.recorders.count(), 1);

        let view = rig.view();
        assert_eq!(view.record_label, LABEL_STOP);
        assert!(!view.play_enabled);
        assert!(view.record_enabled);
        assert_eq!(rig.controller.phase(), Phase::Recording);
    })
    .await;
}

#[tokio::test]
async fn test_stopping_recording_reloads_both() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;

        rig.controller.toggle_record();
        rig.controller.settle().await;
        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert_eq!(rig.players.count(), 2);
        assert_eq!(rig.recorders.count(), 2);
        assert!(rig.recorders.nth(0).destroyed.get());
        assert!(!rig.recorders.latest().is_recording());

        let view = rig.view();
        assert_eq!(view.record_label, LABEL_RECORD);
        assert_eq!(view.play_pause_label, LABEL_PLAY);
        assert!(view.play_enabled);
        assert_eq!(rig.controller.phase(), Phase::Idle);
    })
    .await;
}

#[tokio::test]
async fn test_permission_denied_leaves_recorder_alone() {
    local(async {
        let gate = Gate::answering(Ok(false));
        let mut rig = Rig::ready(gate.clone()).await;

        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert_eq!(gate.requests.get(), 1);
        let recorder = rig.recorders.latest();
        assert_eq!(recorder.toggles.get(), 0);
        assert!(!recorder.is_recording());
        assert_eq!(
            rig.view().last_error.as_deref(),
            Some("Record Audio Permission was denied")
        );
        // The released player is not rebuilt until a take completes
        assert_eq!(rig.players.count(), 1);
        assert!(rig.players.nth(0).destroyed.get());
        let view = rig.view();
        assert!(!view.play_enabled);
        assert!(view.record_enabled);
        assert_eq!(rig.controller.phase(), Phase::Idle);
    })
    .await;
}

#[tokio::test]
async fn test_permission_request_error_is_denial() {
    local(async {
        let gate = Gate::answering(Err("dialog dismissed by system"));
        let mut rig = Rig::ready(gate).await;

        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert_eq!(rig.recorders.latest().toggles.get(), 0);
        assert_eq!(
            rig.view().last_error.as_deref(),
            Some("Record Audio Permission was denied")
        );
    })
    .await;
}

#[tokio::test]
async fn test_permission_granted_starts_recording() {
    local(async {
        let gate = Gate::answering(Ok(true));
        let mut rig = Rig::ready(gate.clone()).await;

        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert_eq!(gate.requests.get(), 1);
        assert!(rig.recorders.latest().is_recording());
        assert_eq!(rig.view().record_label, LABEL_STOP);
    })
    .await;
}

#[tokio::test]
async fn test_record_toggle_failure_leaves_player_released() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        rig.recorders.latest().fail.set(true);

        rig.controller.toggle_record();
        rig.controller.settle().await;

        assert_eq!(
            rig.view().last_error.as_deref(),
            Some("Failed to toggle recording: microphone busy")
        );
        assert_eq!(rig.players.count(), 1);
        assert_eq!(rig.recorders.count(), 1);
        assert!(!rig.view().play_enabled);
        assert_eq!(rig.controller.phase(), Phase::Idle);
    })
    .await;
}

#[tokio::test]
async fn test_superseded_prepare_is_ignored() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.players
            .prepare_errors
            .borrow_mut()
            .push_back(Some("stale failure".into()));

        rig.controller.reload_player();
        rig.controller.reload_player();
        rig.controller.settle().await;

        let first = rig.players.nth(0);
        assert!(first.destroyed.get());
        assert_eq!(first.looping_writes.get(), 0);
        assert_eq!(rig.players.nth(1).looping_writes.get(), 1);
        assert_eq!(rig.view().last_error, None);
    })
    .await;
}

#[tokio::test]
async fn test_ended_notice_reconciles_controls() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        rig.controller.play_pause();
        rig.controller.settle().await;
        assert_eq!(rig.view().play_pause_label, LABEL_PAUSE);
        assert!(!rig.view().record_enabled);

        let player = rig.players.latest();
        player.playing.set(false);
        player.stopped.set(true);
        player.notices.send(PlayerNotice::Ended);
        rig.controller.settle().await;

        let view = rig.view();
        assert_eq!(view.play_pause_label, LABEL_PLAY);
        assert!(view.record_enabled);
        assert!(!view.stop_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_paused_notice_reconciles_controls() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        rig.controller.play_pause();
        rig.controller.settle().await;

        rig.players.latest().playing.set(false);
        rig.players.latest().notices.send(PlayerNotice::Paused);
        rig.controller.settle().await;

        let view = rig.view();
        assert_eq!(view.play_pause_label, LABEL_PLAY);
        assert!(view.stop_enabled);
        assert!(!view.record_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_superseded_notice_is_ignored() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        let old = rig.players.latest();
        rig.controller.reload_player();
        rig.controller.settle().await;

        old.notices.send(PlayerNotice::Ended);
        rig.controller.settle().await;
        assert_eq!(rig.players.count(), 2);
        assert!(rig.view().play_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_seek_suppresses_progress_inside_window() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        let player = rig.players.latest();
        player.current_ms.set(2_500.0);

        let before = Instant::now();
        rig.controller.seek(0.5);
        rig.controller.settle().await;
        assert_eq!(*player.seeks.borrow(), vec![Duration::from_secs(5)]);

        rig.controller.sample_progress(before);
        assert_eq!(rig.view().progress, 0.0);

        rig.controller
            .sample_progress(Instant::now() + Duration::from_millis(201));
        assert_eq!(rig.view().progress, 0.25);
    })
    .await;
}

#[tokio::test]
async fn test_progress_without_seek_publishes_clamped() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;
        let player = rig.players.latest();

        player.current_ms.set(12_000.0);
        rig.controller.sample_progress(Instant::now());
        assert_eq!(rig.view().progress, 1.0);

        player.current_ms.set(f64::NAN);
        rig.controller.sample_progress(Instant::now());
        assert_eq!(rig.view().progress, 0.0);
    })
    .await;
}

#[tokio::test]
async fn test_zero_duration_reads_zero_progress() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.players.duration_ms.set(0.0);
        rig.controller.initialize();
        rig.controller.settle().await;

        rig.players.latest().current_ms.set(300.0);
        rig.controller.sample_progress(Instant::now());
        assert_eq!(rig.view().progress, 0.0);
    })
    .await;
}

#[tokio::test]
async fn test_seek_without_player_is_noop() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.controller.seek(0.5);
        rig.controller.sample_progress(Instant::now());
        rig.controller.settle().await;
        assert_eq!(rig.players.count(), 0);
        assert_eq!(rig.view().progress, 0.0);
    })
    .await;
}

#[tokio::test]
async fn test_disabled_controls_ignore_intents() {
    local(async {
        let mut rig = Rig::new(Rc::new(PreGranted));
        rig.controller.initialize();
        // Prepare has not completed yet, so play is still disabled
        rig.controller.handle_intent(Intent::PlayPause);
        rig.controller.handle_intent(Intent::Stop);
        rig.controller.settle().await;
        assert!(!rig.players.latest().playing.get());

        rig.controller.handle_intent(Intent::ToggleRecord);
        rig.controller.settle().await;
        assert_eq!(rig.controller.phase(), Phase::Recording);

        rig.controller.handle_intent(Intent::PlayPause);
        rig.controller.settle().await;
        assert_eq!(rig.players.count(), 1);
        assert!(!rig.view().play_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_shutdown_intent_outside_run_keeps_handles() {
    local(async {
        let mut rig = Rig::ready(Rc::new(PreGranted)).await;

        rig.controller.handle_intent(Intent::Shutdown);
        rig.controller.settle().await;

        assert!(!rig.players.latest().destroyed.get());
        assert!(!rig.recorders.latest().destroyed.get());
        assert!(rig.view().play_enabled);
    })
    .await;
}

#[tokio::test]
async fn test_run_tears_down_on_shutdown() {
    local(async {
        let Rig {
            controller,
            view,
            players,
            recorders,
        } = Rig::new(Rc::new(PreGranted));
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::task::spawn_local(controller.run(rx));

        tx.send(Intent::SetLooping(true)).await.unwrap();
        tx.send(Intent::Shutdown).await.unwrap();
        task.await.unwrap();

        assert!(view.borrow().loop_enabled);
        let player = players.latest();
        assert!(player.looping.get());
        assert!(player.destroyed.get());
        assert!(recorders.latest().destroyed.get());
    })
    .await;
}
