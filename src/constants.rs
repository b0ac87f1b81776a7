//! Audio and timing constants — SINGLE SOURCE OF TRUTH.
//!
//! All timing/sample-rate constants MUST be imported from here rather than
//! hardcoded at call sites.

use std::time::Duration;

/// Sample rate the streaming ASR and wake recognizer expect (Hz).
pub const ASR_SAMPLE_RATE: u32 = 16_000;

/// Capture block size: ~500ms at 16kHz.
pub const CAPTURE_FRAME_SAMPLES: usize = 8_000;

/// Capture cadence.
pub const CAPTURE_FRAME_INTERVAL: Duration = Duration::from_millis(500);

/// Default microphone gain multiplier, applied post-resample.
pub const DEFAULT_GAIN: f32 = 10.0;

/// Bounded capture queue depth (frames) before drop-oldest backpressure kicks in.
pub const CAPTURE_QUEUE_CAPACITY: usize = 8;

/// Transient read-error budget before the capture stream is reinitialized.
pub const CAPTURE_ERROR_BUDGET: u32 = 10;
pub const CAPTURE_ERROR_WINDOW: Duration = Duration::from_secs(2);

/// Streaming Recognizer timing rules — design-critical, change with care.
pub const ASR_INITIAL_WAIT: Duration = Duration::from_millis(5_000);
pub const ASR_TRAILING_SILENCE: Duration = Duration::from_millis(3_000);
pub const ASR_OUTBOUND_POLL: Duration = Duration::from_millis(100);

/// Listening-state no-speech timeout observed by the Orchestrator tick handler.
pub const LISTENING_TIMEOUT: Duration = ASR_INITIAL_WAIT;

/// Music/News stop-respecting poll period — bounds preemption latency.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Music player join timeout before daemon cleanup.
pub const MUSIC_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Download chunk size for remote music tracks.
pub const DOWNLOAD_CHUNK_BYTES: usize = 8 * 1024;

/// Call Gateway preemption bounds.
pub const CALL_TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const CALL_TASK_DRAIN_POLL: Duration = Duration::from_millis(100);
pub const CALL_HANGUP_DEVICE_RELEASE: Duration = Duration::from_millis(500);

/// Idle read timeout on a signaling WebSocket connection — a collaborator
/// adapter that never sends another frame must not pin a connection task
/// open forever.
pub const CALL_CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Orchestrator tick rate target.
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / TICK_RATE_HZ as u64);

/// Playback pitch-down applied to speech replies and music (not news).
pub const VOICE_PLAYBACK_RATE_SCALE: f32 = 0.8;

/// Number of headlines fetched/played per News cycle.
pub const NEWS_HEADLINE_COUNT: usize = 10;

/// Chat LLM reply word cap.
pub const CHAT_REPLY_MAX_WORDS: usize = 30;

/// Failed-wake-loop backoff before retry.
pub const WAKE_LOOP_RETRY_BACKOFF: Duration = Duration::from_millis(500);
