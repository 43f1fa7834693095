use anyhow::Result;
use std::rc::Rc;

use super::Controller;
use crate::engine::RecorderSettings;
use crate::error::ControlError;
use crate::messages::{Completion, Generation, Phase};
use crate::permission::request_record_permission;

impl Controller {
    /// Replace the recorder with a fresh one bound to the resource.
    pub fn reload_recorder(&mut self) {
        if let Some(recorder) = self.recorder.release() {
            recorder.destroy();
        }

        let generation = self.recorder.advance();
        let recorder = self
            .recorders
            .create(&self.resource, RecorderSettings::STUDIO);
        self.recorder.install(recorder);
        tracing::debug!("Recorder {} bound to {}", generation, self.resource.display());

        self.reconcile();
    }

    /// Start or stop recording. The player is released first since both
    /// sides write and read the same file.
    pub fn toggle_record(&mut self) {
        self.destroy_player();

        let Some((generation, _)) = self.recorder.current() else {
            tracing::warn!("Record toggled with no recorder bound");
            self.reconcile();
            return;
        };

        if self.permissions.requires_explicit_grant() {
            let permissions = Rc::clone(&self.permissions);
            self.spawn_op(async move {
                Completion::Permission {
                    generation,
                    granted: request_record_permission(permissions.as_ref()).await,
                }
            });
        } else {
            self.toggle_recorder();
        }
        self.reconcile();
    }

    fn toggle_recorder(&mut self) {
        let Some((generation, recorder)) = self.recorder.current() else {
            return;
        };
        self.spawn_op(async move {
            Completion::RecordToggled {
                generation,
                result: recorder.toggle_record().await,
            }
        });
    }

    pub(super) fn on_permission(&mut self, generation: Generation, granted: bool) {
        if !self.recorder.is_current(generation) {
            tracing::debug!("Ignoring permission answer for superseded recorder {}", generation);
            return;
        }

        if granted {
            self.toggle_recorder();
        } else {
            self.surface(ControlError::PermissionDenied);
        }
        self.reconcile();
    }

    pub(super) fn on_record_toggled(&mut self, generation: Generation, result: Result<bool>) {
        if !self.recorder.is_current(generation) {
            tracing::debug!("Ignoring record toggle for superseded recorder {}", generation);
            return;
        }

        match result {
            Ok(true) => {
                tracing::info!("Recording finished, reloading player and recorder");
                self.phase = Phase::Idle;
                self.reload_player();
                self.reload_recorder();
            }
            Ok(false) => {
                self.sync_phase();
                if self.phase == Phase::Recording {
                    tracing::info!("Recording started on recorder {}", generation);
                } else {
                    tracing::warn!("Recorder {} toggled but is not recording", generation);
                }
            }
            Err(e) => {
                self.surface(ControlError::RecordToggle(e));
                self.sync_phase();
            }
        }
        self.reconcile();
    }

    fn sync_phase(&mut self) {
        let recording = self.recorder.get().is_some_and(|r| r.is_recording());
        self.phase = if recording { Phase::Recording } else { Phase::Idle };
    }
}
