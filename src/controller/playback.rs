use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;

use super::Controller;
use crate::engine::{NoticeSender, PlayerNotice, PlayerOptions};
use crate::error::{ControlError, TransportOp};
use crate::messages::{Completion, Generation};
use crate::progress::progress_fraction;

impl Controller {
    /// Replace the player with a fresh one bound to the resource and start
    /// preparing it.
    pub fn reload_player(&mut self) {
        self.destroy_player();

        let generation = self.player.advance();
        let notices = NoticeSender::new(generation, self.completion_tx.clone());
        let player = self.players.create(
            &self.resource,
            PlayerOptions {
                auto_destroy: false,
            },
            notices,
        );
        self.player.install(player.clone());
        tracing::debug!("Player {} bound to {}", generation, self.resource.display());

        self.spawn_op(async move {
            Completion::Prepared {
                generation,
                result: player.prepare().await,
            }
        });
        self.reconcile();
    }

    pub(super) fn destroy_player(&mut self) {
        if let Some(player) = self.player.release() {
            player.destroy();
        }
    }

    pub fn play_pause(&mut self) {
        let Some((generation, player)) = self.player.current() else {
            tracing::debug!("Play/pause with no player bound");
            return;
        };
        self.spawn_op(async move {
            Completion::PlayPause {
                generation,
                result: player.play_pause().await,
            }
        });
    }

    pub fn stop(&mut self) {
        let Some((generation, player)) = self.player.current() else {
            tracing::debug!("Stop with no player bound");
            return;
        };
        self.spawn_op(async move {
            Completion::Stopped {
                generation,
                result: player.stop().await,
            }
        });
    }

    /// Seek to `fraction` of the track. Starts the progress cooldown.
    pub fn seek(&mut self, fraction: f64) {
        let Some((generation, player)) = self.player.current() else {
            return;
        };
        self.cooldown.arm(Instant::now());

        let duration_ms = player.status().duration_ms;
        let position = Duration::try_from_secs_f64(fraction.clamp(0.0, 1.0) * duration_ms / 1000.0)
            .unwrap_or_default();
        tracing::debug!("Seeking player {} to {:?}", generation, position);

        self.spawn_op(async move {
            Completion::Seeked {
                generation,
                result: player.seek(position).await,
            }
        });
    }

    /// Store the loop preference and apply it to the bound player, if any.
    /// Later reloads pick the preference up once their prepare succeeds.
    pub fn set_looping(&mut self, enabled: bool) {
        self.looping = enabled;
        if let Some(player) = self.player.get() {
            player.set_looping(enabled);
        }
        self.view.send_modify(|vm| vm.loop_enabled = enabled);
    }

    /// Publish the player's progress unless a seek happened within the
    /// cooldown window.
    pub fn sample_progress(&mut self, now: Instant) {
        let Some(player) = self.player.get() else {
            return;
        };
        if !self.cooldown.allows(now) {
            return;
        }

        let status = player.status();
        let progress = progress_fraction(status.current_time_ms, status.duration_ms);
        self.view.send_if_modified(|vm| {
            if vm.progress == progress {
                return false;
            }
            vm.progress = progress;
            true
        });
    }

    pub(super) fn on_prepared(&mut self, generation: Generation, result: Result<()>) {
        if !self.player.is_current(generation) {
            tracing::debug!("Ignoring prepare result for superseded player {}", generation);
            return;
        }

        match result {
            Ok(()) => {
                if let Some(player) = self.player.get() {
                    player.set_looping(self.looping);
                }
                tracing::info!("Player {} prepared", generation);
            }
            Err(e) => self.surface(ControlError::Prepare(e)),
        }
        self.reconcile();
    }

    pub(super) fn on_play_pause(&mut self, generation: Generation, result: Result<bool>) {
        if !self.player.is_current(generation) {
            tracing::debug!("Ignoring play/pause result for superseded player {}", generation);
            return;
        }

        match result {
            Ok(paused) => tracing::debug!("Player {} paused={}", generation, paused),
            Err(cause) => self.surface(ControlError::Transport {
                op: TransportOp::PlayPause,
                cause,
            }),
        }
        self.reconcile();
    }

    pub(super) fn on_stopped(&mut self, generation: Generation, result: Result<()>) {
        self.finish_transport(generation, TransportOp::Stop, result);
    }

    pub(super) fn on_seeked(&mut self, generation: Generation, result: Result<()>) {
        self.finish_transport(generation, TransportOp::Seek, result);
    }

    fn finish_transport(&mut self, generation: Generation, op: TransportOp, result: Result<()>) {
        if !self.player.is_current(generation) {
            tracing::debug!("Ignoring {} result for superseded player {}", op, generation);
            return;
        }
        if let Err(cause) = result {
            self.surface(ControlError::Transport { op, cause });
        }
        self.reconcile();
    }

    pub(super) fn on_notice(&mut self, generation: Generation, notice: PlayerNotice) {
        if !self.player.is_current(generation) {
            tracing::debug!("Ignoring {:?} from superseded player {}", notice, generation);
            return;
        }
        tracing::debug!("Player {} reported {:?}", generation, notice);
        self.reconcile();
    }
}
