use super::format::AudioFormat;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Live microphone capture. Dropping it stops the device stream and the task
/// forwarding samples to the recorder; use [`AudioCapture::finish`] to keep
/// the samples still buffered.
pub struct AudioCapture {
    stream: Option<cpal::Stream>,
    stop_tx: Option<oneshot::Sender<()>>,
    bridge: Option<JoinHandle<()>>,
}

impl AudioCapture {
    /// Open the default input device and start forwarding interleaved chunks
    /// of roughly 100 ms to `chunk_tx`. Must be called inside a `LocalSet`.
    pub fn start(format: AudioFormat, chunk_tx: mpsc::Sender<Vec<f32>>) -> Result<Self> {
        let ring = HeapRb::<f32>::new(format.samples_for_duration(10.0));
        let (mut producer, consumer) = ring.split();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No input audio device available")?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let notify = Arc::new(Notify::new());
        let notify_callback = notify.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        tracing::warn!("Capture ring full, dropped {} samples", data.len() - pushed);
                    }
                    notify_callback.notify_one();
                },
                move |err| {
                    tracing::error!("Input stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start input stream")?;

        let chunk_size = format.samples_for_duration(0.1);
        let (stop_tx, stop_rx) = oneshot::channel();
        let bridge = tokio::task::spawn_local(Self::bridge_task(
            consumer, chunk_tx, chunk_size, notify, stop_rx,
        ));

        tracing::info!(
            "Capturing {} Hz, {} channel(s)",
            format.sample_rate,
            format.channels
        );
        Ok(Self {
            stream: Some(stream),
            stop_tx: Some(stop_tx),
            bridge: Some(bridge),
        })
    }

    /// Stop the device and wait for the bridge to forward the partial chunk
    /// left in the ring. The chunk channel closes once this resolves.
    pub async fn finish(mut self) -> Result<()> {
        drop(self.stream.take());
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.await.context("Capture bridge task failed")?;
        }
        Ok(())
    }

    async fn bridge_task(
        mut consumer: impl Consumer<Item = f32>,
        tx: mpsc::Sender<Vec<f32>>,
        chunk_size: usize,
        notify: Arc<Notify>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = notify.notified() => {}
                _ = &mut stop_rx => break,
            }

            while consumer.occupied_len() >= chunk_size {
                let mut chunk = vec![0.0f32; chunk_size];
                let n = consumer.pop_slice(&mut chunk);
                chunk.truncate(n);

                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        }

        // The stream is gone, so whatever is left is the tail of the take
        while !consumer.is_empty() {
            let mut chunk = vec![0.0f32; chunk_size.min(consumer.occupied_len())];
            let n = consumer.pop_slice(&mut chunk);
            chunk.truncate(n);

            if tx.send(chunk).await.is_err() {
                return;
            }
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(bridge) = &self.bridge {
            bridge.abort();
        }
    }
}
