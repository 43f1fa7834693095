use crate::engine::{AudioPlayer, NoticeSender, PlayerFactory, PlayerNotice, PlayerOptions, PlayerStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::cell::RefCell;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::Duration;

const END_POLL: Duration = Duration::from_millis(50);

fn open_source(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to decode {}", path.display()))
}

struct Transport {
    // Kept alive for as long as the sink plays through it
    _output: OutputStream,
    sink: Sink,
    duration: Option<Duration>,
    stopped: bool,
}

#[derive(Default)]
struct State {
    transport: Option<Transport>,
    looping: bool,
    destroyed: bool,
}

/// Plays the resource through the default output device
///
/// The file is re-decoded on every start from stopped, so playback always
/// reflects the latest recording.
pub struct RodioPlayer {
    resource: PathBuf,
    auto_destroy: bool,
    notices: NoticeSender,
    state: Rc<RefCell<State>>,
}

impl RodioPlayer {
    /// Requeue or report the end of the track. Exits once the player is
    /// dropped or destroyed.
    async fn watch_end(
        state: Weak<RefCell<State>>,
        resource: PathBuf,
        auto_destroy: bool,
        notices: NoticeSender,
    ) {
        let mut ticker = tokio::time::interval(END_POLL);
        loop {
            ticker.tick().await;
            let Some(state) = state.upgrade() else {
                return;
            };

            let ended = {
                let mut state = state.borrow_mut();
                if state.destroyed {
                    return;
                }
                let looping = state.looping;
                let Some(transport) = state.transport.as_mut() else {
                    continue;
                };
                if transport.stopped || !transport.sink.empty() {
                    continue;
                }

                if looping {
                    match open_source(&resource) {
                        Ok(source) => {
                            transport.sink.append(source);
                            false
                        }
                        Err(e) => {
                            tracing::warn!("Loop restart failed: {:#}", e);
                            transport.stopped = true;
                            true
                        }
                    }
                } else {
                    transport.stopped = true;
                    if auto_destroy {
                        state.transport = None;
                        state.destroyed = true;
                    }
                    true
                }
            };

            if ended {
                notices.send(PlayerNotice::Ended);
            }
        }
    }
}

#[async_trait(?Send)]
impl AudioPlayer for RodioPlayer {
    async fn prepare(&self) -> Result<()> {
        let source = open_source(&self.resource)?;
        let duration = source.total_duration();
        drop(source);

        let output = OutputStreamBuilder::open_default_stream()
            .context("Failed to open default output stream")?;
        let sink = Sink::connect_new(output.mixer());
        sink.pause();

        {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                anyhow::bail!("Player destroyed while preparing");
            }
            state.transport = Some(Transport {
                _output: output,
                sink,
                duration,
                stopped: true,
            });
        }

        tokio::task::spawn_local(Self::watch_end(
            Rc::downgrade(&self.state),
            self.resource.clone(),
            self.auto_destroy,
            self.notices.clone(),
        ));

        tracing::debug!("Prepared {} ({:?})", self.resource.display(), duration);
        Ok(())
    }

    async fn play_pause(&self) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        let transport = state.transport.as_mut().context("Player is not prepared")?;

        if transport.stopped {
            transport.sink.append(open_source(&self.resource)?);
            transport.sink.play();
            transport.stopped = false;
            return Ok(false);
        }

        if transport.sink.is_paused() {
            transport.sink.play();
            Ok(false)
        } else {
            transport.sink.pause();
            drop(state);
            self.notices.send(PlayerNotice::Paused);
            Ok(true)
        }
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let transport = state.transport.as_mut().context("Player is not prepared")?;
        transport.sink.clear();
        transport.stopped = true;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let transport = state.transport.as_mut().context("Player is not prepared")?;

        // Seeking from stopped cues the track up paused
        if transport.stopped {
            transport.sink.append(open_source(&self.resource)?);
            transport.sink.pause();
            transport.stopped = false;
        }

        transport
            .sink
            .try_seek(position)
            .map_err(|e| anyhow::anyhow!("Failed to seek to {:?}: {}", position, e))
    }

    fn set_looping(&self, looping: bool) {
        self.state.borrow_mut().looping = looping;
    }

    fn status(&self) -> PlayerStatus {
        let state = self.state.borrow();
        match state.transport.as_ref() {
            Some(transport) if !state.destroyed => {
                let paused = transport.sink.is_paused();
                PlayerStatus {
                    is_playing: !transport.stopped && !paused && !transport.sink.empty(),
                    is_stopped: transport.stopped,
                    can_play: true,
                    can_stop: !transport.stopped,
                    current_time_ms: if transport.stopped {
                        0.0
                    } else {
                        transport.sink.get_pos().as_secs_f64() * 1000.0
                    },
                    duration_ms: transport
                        .duration
                        .map_or(-1.0, |d| d.as_secs_f64() * 1000.0),
                }
            }
            _ => PlayerStatus {
                is_playing: false,
                is_stopped: true,
                can_play: false,
                can_stop: false,
                current_time_ms: -1.0,
                duration_ms: -1.0,
            },
        }
    }

    fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        state.destroyed = true;
        if let Some(transport) = state.transport.take() {
            transport.sink.stop();
        }
    }
}

pub struct RodioPlayerFactory;

impl PlayerFactory for RodioPlayerFactory {
    fn create(
        &self,
        resource: &Path,
        options: PlayerOptions,
        notices: NoticeSender,
    ) -> Rc<dyn AudioPlayer> {
        tracing::debug!("New player for {} ({:?})", resource.display(), options);
        Rc::new(RodioPlayer {
            resource: resource.to_path_buf(),
            auto_destroy: options.auto_destroy,
            notices,
            state: Rc::new(RefCell::new(State::default())),
        })
    }
}
