// NOTE: Captured audio is interleaved f32 from cpal, written as 16-bit signed
// PCM. Bitrate and quality in RecorderSettings only matter to compressed
// encoders, which we don't have.

use crate::engine::RecorderSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Number of interleaved samples covering `seconds` of audio
    pub fn samples_for_duration(&self, seconds: f32) -> usize {
        (self.sample_rate as f32 * self.channels as f32 * seconds) as usize
    }
}

impl From<RecorderSettings> for AudioFormat {
    fn from(settings: RecorderSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
        }
    }
}
