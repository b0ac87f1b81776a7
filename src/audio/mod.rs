//! Audio capture (Audio Source) and playback (Audio Sink).

pub mod device;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod source;

pub use queue::{AudioFrame, AudioFrameQueue};
pub use sink::AudioSink;
pub use source::AudioSource;
