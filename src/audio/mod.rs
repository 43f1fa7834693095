pub mod capture;
pub mod format;
pub mod player;
pub mod recorder;
pub mod sink;
pub mod wav_sink;

pub use capture::AudioCapture;
pub use format::AudioFormat;
pub use player::RodioPlayerFactory;
pub use recorder::CpalRecorderFactory;
pub use sink::AudioSink;
pub use wav_sink::WavSink;
