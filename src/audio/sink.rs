use anyhow::Result;
use async_trait::async_trait;

/// Streaming encoder for one recording session
///
/// Samples are written as they arrive; `finalize` flushes and closes the file.
#[async_trait]
pub trait AudioSink: Send {
    /// The Vec is moved to avoid copying
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()>;

    async fn finalize(&mut self) -> Result<()>;
}
