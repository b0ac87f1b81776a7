//! Audio Sink — speech/file playback through the default output device.
//!
//! `play()` supports a blocking mode (the calling thread — always a
//! worker, never the tick thread — blocks until playback ends) and a
//! non-blocking mode. `stop()` is immediate: it flips an atomic flag the
//! playback thread checks every output-buffer callback, bounding
//! cancellation latency to one device-buffer period.
//!
//! Playback-rate policy: replies and music play at 0.8× native rate (a
//! deliberate pitch-down stylistic choice); news headlines play at native
//! rate. This is implemented by stepping the read cursor through the
//! decoded samples at `rate_scale` per output sample with linear
//! interpolation, rather than by asking the device for a non-standard
//! sample rate.

use crate::constants::VOICE_PLAYBACK_RATE_SCALE;
use crate::error::{MirrorError, Result};
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "audio-cpal")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

pub struct AudioSink {
    playing: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
}

impl Default for AudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink {
    pub fn new() -> Self {
        Self {
            playing: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Halts playback immediately (at most one device-buffer period).
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Decode and play `path`. Replies and music pass `rate_scale =
    /// VOICE_PLAYBACK_RATE_SCALE`; news headlines pass `1.0`.
    pub fn play(&self, path: &Path, blocking: bool, rate_scale: f32) -> Result<()> {
        let (samples, native_rate) = decode_wav(path)?;

        self.stop_flag.store(false, Ordering::Release);
        self.playing.store(true, Ordering::Release);

        let playing = self.playing.clone();
        let stop_flag = self.stop_flag.clone();

        let worker = move || {
            if let Err(e) = run_playback(samples, native_rate, rate_scale, stop_flag.clone()) {
                tracing::warn!("playback failed: {e}");
            }
            playing.store(false, Ordering::Release);
        };

        if blocking {
            worker();
        } else {
            std::thread::spawn(worker);
        }
        Ok(())
    }
}

fn decode_wav(path: &Path) -> Result<(Vec<i16>, u32)> {
    let file = std::fs::File::open(path).map_err(MirrorError::Io)?;
    let reader = hound::WavReader::new(BufReader::new(file))
        .map_err(|e| MirrorError::DecodeFailure(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let samples: std::result::Result<Vec<i16>, _> = reader.into_samples::<i16>().collect();
    let samples = samples.map_err(|e| MirrorError::DecodeFailure(e.to_string()))?;
    Ok((samples, spec.sample_rate))
}

#[cfg(feature = "audio-cpal")]
fn run_playback(
    samples: Vec<i16>,
    native_rate: u32,
    rate_scale: f32,
    stop_flag: Arc<AtomicBool>,
) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| MirrorError::DeviceUnavailable("no default output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| MirrorError::DeviceUnavailable(e.to_string()))?;
    let channels = config.channels() as usize;
    let stream_config: cpal::StreamConfig = config.clone().into();

    let done = Arc::new(AtomicBool::new(false));
    let done_cb = done.clone();
    let mut cursor = 0f32;
    let step = rate_scale * native_rate as f32 / stream_config.sample_rate.0 as f32;
    let stop_cb = stop_flag.clone();

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                if stop_cb.load(Ordering::Acquire) {
                    data.fill(0.0);
                    done_cb.store(true, Ordering::Release);
                    return;
                }
                for frame in data.chunks_mut(channels) {
                    let idx = cursor as usize;
                    let value = if idx + 1 < samples.len() {
                        let frac = cursor.fract();
                        let a = samples[idx] as f32;
                        let b = samples[idx + 1] as f32;
                        (a + (b - a) * frac) / i16::MAX as f32
                    } else {
                        done_cb.store(true, Ordering::Release);
                        0.0
                    };
                    for ch in frame.iter_mut() {
                        *ch = value;
                    }
                    cursor += step;
                }
            },
            |err| tracing::warn!("playback stream error: {err}"),
            None,
        )
        .map_err(|e| MirrorError::DeviceUnavailable(e.to_string()))?;

    stream.play().map_err(|e| MirrorError::DeviceUnavailable(e.to_string()))?;

    while !done.load(Ordering::Acquire) && !stop_flag.load(Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    Ok(())
}

#[cfg(not(feature = "audio-cpal"))]
fn run_playback(
    _samples: Vec<i16>,
    _native_rate: u32,
    _rate_scale: f32,
    _stop_flag: Arc<AtomicBool>,
) -> Result<()> {
    Err(MirrorError::DeviceUnavailable("compiled without audio-cpal feature".into()))
}

pub const SPEECH_RATE_SCALE: f32 = VOICE_PLAYBACK_RATE_SCALE;
pub const NEWS_RATE_SCALE: f32 = 1.0;
