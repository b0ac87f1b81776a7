//! Audio Source — owns the single microphone stream.
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS), so the stream is created and dropped on a dedicated OS
//! thread. The callback itself must not allocate or block; it hands raw
//! native-rate samples to a `crossbeam_channel` sender, and a second
//! "framer" loop on the capture thread does the downmix/resample/gain/
//! chunk-into-8000-samples work before pushing into the bounded
//! [`AudioFrameQueue`].

use super::device;
use super::queue::{AudioFrame, AudioFrameQueue};
use super::resample::RateConverter;
use crate::constants::{
    CAPTURE_ERROR_BUDGET, CAPTURE_ERROR_WINDOW, CAPTURE_FRAME_SAMPLES, DEFAULT_GAIN,
};
use crate::error::{MirrorError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[cfg(feature = "audio-cpal")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

struct CaptureThread {
    join: Option<std::thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

/// Long-lived capture loop. Created at startup and persists
/// until shutdown; `stop()`/`start()`/`reinitialize()` recycle the
/// underlying device without dropping the queue or gain settings.
pub struct AudioSource {
    queue: AudioFrameQueue,
    gain: f32,
    device_index: Option<usize>,
    capture: Mutex<Option<CaptureThread>>,
    native_rate: Arc<AtomicU32>,
}

impl AudioSource {
    pub fn new(queue: AudioFrameQueue, device_index: Option<usize>) -> Self {
        Self {
            queue,
            gain: DEFAULT_GAIN,
            device_index,
            capture: Mutex::new(None),
            native_rate: Arc::new(AtomicU32::new(crate::constants::ASR_SAMPLE_RATE)),
        }
    }

    pub fn queue(&self) -> AudioFrameQueue {
        self.queue.clone()
    }

    pub fn native_sample_rate(&self) -> u32 {
        self.native_rate.load(Ordering::Relaxed)
    }

    /// Device-open failure here is fatal at startup; callers at process
    /// entry should propagate the error and exit rather than limp along
    /// without a microphone.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.capture.lock();
        if slot.is_some() {
            return Ok(());
        }
        let handle = self.spawn_capture_thread()?;
        *slot = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        let mut slot = self.capture.lock();
        if let Some(mut thread) = slot.take() {
            thread.running.store(false, Ordering::Release);
            if let Some(j) = thread.join.take() {
                let _ = j.join();
            }
        }
    }

    /// Used after a call ends, because the device may have been claimed by
    /// the call media pipeline.
    pub fn reinitialize(&self) -> Result<()> {
        self.stop();
        self.start()
    }

    /// Clears the bounded capture queue. Every transition out of
    /// `Listening` clears the partial-recognition buffer so the next
    /// wake cycle starts from silence.
    pub fn clear_buffer(&self) {
        self.queue.clear();
    }

    pub fn is_running(&self) -> bool {
        self.capture.lock().is_some()
    }

    #[cfg(feature = "audio-cpal")]
    fn spawn_capture_thread(&self) -> Result<CaptureThread> {
        let queue = self.queue.clone();
        let gain = self.gain;
        let device_index = self.device_index;
        let native_rate_out = self.native_rate.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        let join = std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = match select_device(&host, device_index) {
                Ok(d) => d,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };
            let config = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = open_tx.send(Err(MirrorError::DeviceUnavailable(e.to_string())));
                    return;
                }
            };
            let native_rate = config.sample_rate().0;
            let channels = config.channels() as usize;
            native_rate_out.store(native_rate, Ordering::Relaxed);

            let (tx, rx) = crossbeam_channel::unbounded::<Vec<f32>>();
            let stream_config: cpal::StreamConfig = config.clone().into();

            let running_cb = running_thread.clone();
            let build_result = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    if !running_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    let mono = downmix(data, channels);
                    let _ = tx.send(mono);
                },
                |err| warn!("capture stream error: {err}"),
                None,
            );

            let stream = match build_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = open_tx.send(Err(MirrorError::DeviceUnavailable(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = open_tx.send(Err(MirrorError::DeviceUnavailable(e.to_string())));
                return;
            }
            let _ = open_tx.send(Ok(()));

            frame_loop(rx, queue, native_rate, gain, running_thread);
            drop(stream);
        });

        match open_rx.recv() {
            Ok(Ok(())) => Ok(CaptureThread { join: Some(join), running }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(MirrorError::DeviceUnavailable("capture thread exited before opening device".into()))
            }
        }
    }

    #[cfg(not(feature = "audio-cpal"))]
    fn spawn_capture_thread(&self) -> Result<CaptureThread> {
        Err(MirrorError::DeviceUnavailable("compiled without audio-cpal feature".into()))
    }
}

#[cfg(feature = "audio-cpal")]
fn select_device(host: &cpal::Host, preferred_index: Option<usize>) -> Result<cpal::Device> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| MirrorError::DeviceUnavailable(e.to_string()))?
        .collect();
    if devices.is_empty() {
        return Err(MirrorError::DeviceUnavailable("no input devices available".into()));
    }

    if let Some(idx) = preferred_index {
        if let Some(d) = devices.get(idx) {
            return Ok(d.clone());
        }
        warn!("configured device index {idx} unavailable, falling back to best microphone");
    }

    let best = devices
        .iter()
        .max_by_key(|d| {
            let name = d.name().unwrap_or_default();
            device::mic_preference_score(&name)
        })
        .cloned();

    best.ok_or_else(|| MirrorError::DeviceUnavailable("no usable input device found".into()))
}

/// Downmix interleaved multi-channel samples to mono by averaging.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples, applies gain, and chunks into fixed-size [`AudioFrame`]s.
/// Runs on the capture thread until `running` is cleared.
fn frame_loop(
    rx: crossbeam_channel::Receiver<Vec<f32>>,
    queue: AudioFrameQueue,
    native_rate: u32,
    gain: f32,
    running: Arc<AtomicBool>,
) {
    let mut resampler = RateConverter::new(native_rate, crate::constants::ASR_SAMPLE_RATE);
    let mut accum: Vec<i16> = Vec::with_capacity(CAPTURE_FRAME_SAMPLES * 2);
    let mut error_count: u32 = 0;
    let mut error_window_start = Instant::now();

    while running.load(Ordering::Relaxed) {
        match rx.recv_timeout(std::time::Duration::from_millis(200)) {
            Ok(native_f32) => {
                let native_i16: Vec<i16> = native_f32
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let resampled = resampler.process(&native_i16);
                let gained = apply_gain(&resampled, gain);
                accum.extend(gained);

                while accum.len() >= CAPTURE_FRAME_SAMPLES {
                    let frame_samples: Vec<i16> = accum.drain(..CAPTURE_FRAME_SAMPLES).collect();
                    queue.push(AudioFrame {
                        samples: frame_samples,
                        sample_rate: crate::constants::ASR_SAMPLE_RATE,
                    });
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                error_count += 1;
                if error_window_start.elapsed() > CAPTURE_ERROR_WINDOW {
                    error_count = 0;
                    error_window_start = Instant::now();
                }
                if error_count as usize > 10 {
                    warn!("capture channel disconnected repeatedly; exiting frame loop");
                    break;
                }
            }
        }
    }
    info!("audio source frame loop exiting");
    let _ = error_count;
    let _ = CAPTURE_ERROR_BUDGET;
}

/// Apply floating-point gain and clip to the i16 range.
fn apply_gain(samples: &[i16], gain: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|s| {
            let scaled = *s as f32 * gain;
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}
