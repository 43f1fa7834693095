use super::{AudioCapture, AudioFormat, AudioSink, WavSink};
use crate::engine::{AudioRecorder, RecorderFactory, RecorderSettings};
use crate::messages::RecorderCommand;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};

/// Owns capture and encoding for one resource
///
/// Each session truncates the resource, streams captured chunks into a WAV
/// sink and finalizes it on stop.
///
/// Note: holds cpal::Stream which is !Send, so it runs on the LocalSet via
/// tokio::task::spawn_local.
struct RecorderService {
    resource: PathBuf,
    format: AudioFormat,
    cmd_rx: mpsc::Receiver<RecorderCommand>,
    session: Option<Session>,
}

struct Session {
    capture: AudioCapture,
    audio_rx: mpsc::Receiver<Vec<f32>>,
    sink: Box<dyn AudioSink>,
}

async fn next_chunk(session: &mut Option<Session>) -> Option<Vec<f32>> {
    match session {
        Some(session) => session.audio_rx.recv().await,
        None => std::future::pending().await,
    }
}

impl RecorderService {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(RecorderCommand::Start(reply)) => {
                        let _ = reply.send(self.start());
                    }
                    Some(RecorderCommand::Stop(reply)) => {
                        let _ = reply.send(self.stop().await);
                    }
                    Some(RecorderCommand::Shutdown) | None => break,
                },

                Some(chunk) = next_chunk(&mut self.session) => {
                    let failed = self
                        .session
                        .as_mut()
                        .map(|session| session.sink.write_chunk(chunk))
                        .and_then(Result::err);
                    if let Some(e) = failed {
                        tracing::error!("Failed to write audio chunk: {}", e);
                    }
                }
            }
        }

        if self.session.is_some() {
            tracing::warn!("Recorder shut down mid-session, finalizing {}", self.resource.display());
            if let Err(e) = self.stop().await {
                tracing::error!("{:#}", e);
            }
        }
        tracing::debug!("Recorder for {} stopped", self.resource.display());
    }

    fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            anyhow::bail!("Already recording");
        }

        let sink = WavSink::create(&self.resource, self.format)?;
        let (audio_tx, audio_rx) = mpsc::channel(100);
        let capture = AudioCapture::start(self.format, audio_tx)?;

        self.session = Some(Session {
            capture,
            audio_rx,
            sink: Box::new(sink),
        });
        tracing::info!("Recording to {}", self.resource.display());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Session {
            capture,
            mut audio_rx,
            mut sink,
        } = self.session.take().context("Not recording")?;

        // Keep writing while the capture flushes; the channel closes after
        // the tail is forwarded
        let mut finish = std::pin::pin!(capture.finish());
        let mut flushed = false;
        loop {
            tokio::select! {
                result = &mut finish, if !flushed => {
                    flushed = true;
                    result?;
                }
                chunk = audio_rx.recv() => match chunk {
                    Some(chunk) => sink.write_chunk(chunk)?,
                    None => break,
                },
            }
        }
        if !flushed {
            finish.await?;
        }

        sink.finalize().await?;
        tracing::info!("Recording saved to {}", self.resource.display());
        Ok(())
    }
}

/// Recorder handle backed by a capture actor
pub struct CpalRecorder {
    tx: mpsc::Sender<RecorderCommand>,
    recording: Cell<bool>,
}

impl CpalRecorder {
    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> RecorderCommand,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send recorder command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive recorder response: {}", e))?
    }
}

#[async_trait(?Send)]
impl AudioRecorder for CpalRecorder {
    async fn toggle_record(&self) -> Result<bool> {
        if self.recording.get() {
            // The session is gone either way once the actor handles Stop
            self.recording.set(false);
            self.request(RecorderCommand::Stop).await?;
            Ok(true)
        } else {
            self.request(RecorderCommand::Start).await?;
            self.recording.set(true);
            Ok(false)
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.get()
    }

    fn destroy(&self) {
        self.recording.set(false);
        if self.tx.try_send(RecorderCommand::Shutdown).is_err() {
            tracing::debug!("Recorder actor already gone");
        }
    }
}

pub struct CpalRecorderFactory;

impl RecorderFactory for CpalRecorderFactory {
    fn create(&self, resource: &Path, settings: RecorderSettings) -> Rc<dyn AudioRecorder> {
        tracing::debug!(
            "New recorder: {} bps, {} ch, {} Hz, {:?} quality",
            settings.bitrate,
            settings.channels,
            settings.sample_rate,
            settings.quality
        );

        let (tx, cmd_rx) = mpsc::channel(10);
        let service = RecorderService {
            resource: resource.to_path_buf(),
            format: AudioFormat::from(settings),
            cmd_rx,
            session: None,
        };
        tokio::task::spawn_local(service.run());

        Rc::new(CpalRecorder {
            tx,
            recording: Cell::new(false),
        })
    }
}
