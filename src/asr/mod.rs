//! Streaming Recognizer — collaborates with a remote streaming ASR to
//! produce at most one final [`AsrResult`] per wake cycle.
//!
//! The three timing rules are design-critical and implemented exactly as
//! specified:
//! - **Initial wait**: up to 5.0s for the first non-empty interim.
//! - **Trailing silence**: once content has been observed, 3.0s of
//!   inactivity terminates with the most recent final (or empty).
//! - **Early-stop on final**: any non-empty final result ends the cycle
//!   immediately.

use crate::constants::{ASR_INITIAL_WAIT, ASR_OUTBOUND_POLL, ASR_SAMPLE_RATE, ASR_TRAILING_SILENCE};
use crate::audio::{AudioFrame, AudioFrameQueue};
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The final transcript and its metadata: language code and any runner-up
/// alternatives the recognizer offered. `text` is empty when no
/// utterance was captured.
#[derive(Debug, Clone, Default)]
pub struct AsrResult {
    pub text: String,
    pub confidence: f32,
    pub language_code: String,
    pub alternatives: Vec<String>,
}

impl AsrResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Interim or final transcript, as emitted by the remote streaming
/// recognizer collaborator.
#[derive(Debug, Clone)]
pub enum AsrEvent {
    Interim { text: String },
    Final { text: String, confidence: f32, language_code: String, alternatives: Vec<String> },
}

/// Remote streaming ASR collaborator contract. Implementations
/// drive a bidirectional stream: audio frames in via `frames`, transcripts
/// out via the returned receiver.
#[async_trait]
pub trait StreamingAsrClient: Send + Sync {
    async fn recognize(&self, frames: mpsc::Receiver<AudioFrame>) -> mpsc::Receiver<AsrEvent>;
}

#[async_trait]
impl StreamingAsrClient for Box<dyn StreamingAsrClient> {
    async fn recognize(&self, frames: mpsc::Receiver<AudioFrame>) -> mpsc::Receiver<AsrEvent> {
        (**self).recognize(frames).await
    }
}

pub struct StreamingRecognizer<'a, C: StreamingAsrClient> {
    client: &'a C,
}

impl<'a, C: StreamingAsrClient> StreamingRecognizer<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Run one recognition cycle against `queue`, persisting the final
    /// transcript to `persist_path` as a side effect when non-empty (spec
    /// §4.3 "Output", §6 "Persisted state").
    pub async fn run(
        &self,
        queue: &AudioFrameQueue,
        persist_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> AsrResult {
        let (outbound_tx, outbound_rx) = mpsc::channel::<AudioFrame>(64);
        let pump_cancel = cancel.child_token();
        let pump_queue = queue.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    _ = tokio::time::sleep(ASR_OUTBOUND_POLL) => {
                        while let Some(frame) = pump_queue.pop() {
                            if outbound_tx.send(frame).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        let mut events_rx = self.client.recognize(outbound_rx).await;

        let result = self.collect(&mut events_rx, cancel).await;

        pump.abort();

        if let (Some(path), false) = (persist_path, result.is_empty()) {
            if let Err(e) = std::fs::write(path, format!("{}\n", result.text)) {
                warn!("failed to persist transcript to {}: {e}", path.display());
            }
        }

        result
    }

    async fn collect(&self, events_rx: &mut mpsc::Receiver<AsrEvent>, cancel: &CancellationToken) -> AsrResult {
        let start = Instant::now();
        let mut content_observed = false;
        let mut last_final: Option<AsrResult> = None;

        loop {
            let wait = if content_observed {
                ASR_TRAILING_SILENCE
            } else {
                ASR_INITIAL_WAIT.saturating_sub(start.elapsed())
            };

            tokio::select! {
                _ = cancel.cancelled() => return last_final.unwrap_or_default(),
                _ = tokio::time::sleep(wait) => {
                    // Timeout: initial wait expired with nothing, or trailing
                    // silence expired after content — either way we stop here.
                    return last_final.unwrap_or_default();
                }
                event = events_rx.recv() => {
                    match event {
                        None => return last_final.unwrap_or_default(),
                        Some(AsrEvent::Interim { text }) => {
                            if !text.is_empty() {
                                content_observed = true;
                            }
                        }
                        Some(AsrEvent::Final { text, confidence, language_code, alternatives }) => {
                            if !text.is_empty() {
                                // Early-stop: terminate immediately on a non-empty final.
                                return AsrResult { text, confidence, language_code, alternatives };
                            }
                            last_final = Some(AsrResult { text, confidence, language_code, alternatives });
                        }
                    }
                }
            }
        }
    }
}

pub fn sample_rate() -> u32 {
    ASR_SAMPLE_RATE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct ScriptedAsr {
        events: Arc<Mutex<Vec<AsrEvent>>>,
        delay_between: tokio::time::Duration,
    }

    #[async_trait]
    impl StreamingAsrClient for ScriptedAsr {
        async fn recognize(&self, _frames: mpsc::Receiver<AudioFrame>) -> mpsc::Receiver<AsrEvent> {
            let (tx, rx) = mpsc::channel(16);
            let events = self.events.clone();
            let delay = self.delay_between;
            tokio::spawn(async move {
                let mut events = events.lock().await;
                for event in events.drain(..) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                }
            });
            rx
        }
    }

    #[tokio::test(start_paused = true)]
    async fn early_stop_on_nonempty_final() {
        let client = ScriptedAsr {
            events: Arc::new(Mutex::new(vec![
                AsrEvent::Interim { text: "show".into() },
                AsrEvent::Final {
                    text: "show me the news".into(),
                    confidence: 0.9,
                    language_code: "en-US".into(),
                    alternatives: vec![],
                },
            ])),
            delay_between: tokio::time::Duration::from_millis(10),
        };
        let queue = AudioFrameQueue::new(4);
        let recognizer = StreamingRecognizer::new(&client);
        let cancel = CancellationToken::new();
        let result = recognizer.run(&queue, None, &cancel).await;
        assert_eq!(result.text, "show me the news");
    }

    #[tokio::test(start_paused = true)]
    async fn no_speech_times_out_empty_after_initial_wait() {
        let client = ScriptedAsr { events: Arc::new(Mutex::new(vec![])), delay_between: tokio::time::Duration::from_millis(0) };
        let queue = AudioFrameQueue::new(4);
        let recognizer = StreamingRecognizer::new(&client);
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            ASR_INITIAL_WAIT + tokio::time::Duration::from_secs(1),
            recognizer.run(&queue, None, &cancel),
        )
        .await
        .expect("recognizer should terminate on its own");
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_silence_terminates_with_most_recent_final() {
        let client = ScriptedAsr {
            events: Arc::new(Mutex::new(vec![
                AsrEvent::Interim { text: "hi".into() },
                AsrEvent::Final { text: "".into(), confidence: 0.0, language_code: "en-US".into(), alternatives: vec![] },
            ])),
            delay_between: tokio::time::Duration::from_millis(10),
        };
        let queue = AudioFrameQueue::new(4);
        let recognizer = StreamingRecognizer::new(&client);
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            ASR_TRAILING_SILENCE + tokio::time::Duration::from_secs(2),
            recognizer.run(&queue, None, &cancel),
        )
        .await
        .expect("recognizer should terminate after trailing silence");
        assert!(result.is_empty());
    }
}
