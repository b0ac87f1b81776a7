//! Wake Detector — local keyword spotting.
//!
//! The local recognizer is a collaborator: `reset()`, `accept()`,
//! `partial()`. No network is involved. Both partial and final results are
//! searched case-insensitively for the wake phrase; the recognizer is
//! reset at the start of every cycle to purge previous utterances.

use crate::audio::AudioFrameQueue;
use crate::constants::STOP_POLL_INTERVAL;
use tokio_util::sync::CancellationToken;

/// Local keyword-spotter collaborator contract.
pub trait WakeRecognizer: Send {
    /// Purge any previously accumulated utterance state.
    fn reset(&mut self);
    /// Feed a block of 16 kHz mono PCM; returns a final transcript when the
    /// recognizer commits to one.
    fn accept(&mut self, samples: &[i16]) -> Option<String>;
    /// The current in-progress (non-final) transcript, if any.
    fn partial(&self) -> Option<String>;
}

pub struct WakeDetector<R: WakeRecognizer> {
    phrase: String,
    recognizer: R,
}

impl<R: WakeRecognizer> WakeDetector<R> {
    pub fn new(phrase: impl Into<String>, recognizer: R) -> Self {
        Self { phrase: phrase.into().to_lowercase(), recognizer }
    }

    /// Reclaims ownership of the recognizer once detection finishes, so a
    /// long-lived recognizer instance can be reused across wake cycles.
    pub fn into_recognizer(self) -> R {
        self.recognizer
    }

    /// Consume frames from `queue` until the wake phrase is detected in a
    /// final or partial result, or `cancel` fires. Only called while state
    /// is `Idle` (the Orchestrator gates spawning this task so a second
    /// wake detection can never start while one is already running).
    pub async fn run(&mut self, queue: &AudioFrameQueue, cancel: &CancellationToken) -> bool {
        self.recognizer.reset();
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match queue.pop() {
                Some(frame) => {
                    if let Some(final_text) = self.recognizer.accept(&frame.samples) {
                        if contains_phrase(&final_text, &self.phrase) {
                            return true;
                        }
                    }
                    if let Some(partial_text) = self.recognizer.partial() {
                        if contains_phrase(&partial_text, &self.phrase) {
                            return true;
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {}
                        _ = cancel.cancelled() => return false,
                    }
                }
            }
        }
    }
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.to_lowercase().contains(phrase)
}

/// A minimal local recognizer used where no real keyword-spotter model is
/// wired up: treats each accepted frame's checksum-derived "word" as
/// committed text supplied by a test harness via [`ScriptedRecognizer`].
/// Production deployments substitute a real on-device keyword spotter
/// behind the same [`WakeRecognizer`] trait.
pub struct ScriptedRecognizer {
    script: std::collections::VecDeque<String>,
    last_partial: Option<String>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<String>) -> Self {
        Self { script: script.into(), last_partial: None }
    }
}

impl WakeRecognizer for Box<dyn WakeRecognizer> {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn accept(&mut self, samples: &[i16]) -> Option<String> {
        (**self).accept(samples)
    }

    fn partial(&self) -> Option<String> {
        (**self).partial()
    }
}

impl WakeRecognizer for ScriptedRecognizer {
    fn reset(&mut self) {
        self.last_partial = None;
    }

    fn accept(&mut self, _samples: &[i16]) -> Option<String> {
        self.script.pop_front()
    }

    fn partial(&self) -> Option<String> {
        self.last_partial.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;

    fn frame() -> AudioFrame {
        AudioFrame { samples: vec![0; 10], sample_rate: 16_000 }
    }

    #[tokio::test]
    async fn detects_wake_phrase_in_final_result() {
        let queue = AudioFrameQueue::new(4);
        queue.push(frame());
        let recognizer = ScriptedRecognizer::new(vec!["well hello there".into()]);
        let mut detector = WakeDetector::new("hello", recognizer);
        let cancel = CancellationToken::new();
        assert!(detector.run(&queue, &cancel).await);
    }

    #[tokio::test]
    async fn cancel_token_stops_detector_with_no_frames() {
        let queue = AudioFrameQueue::new(4);
        let recognizer = ScriptedRecognizer::new(vec![]);
        let mut detector = WakeDetector::new("hello", recognizer);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!detector.run(&queue, &cancel).await);
    }

    #[test]
    fn phrase_match_is_case_insensitive_substring() {
        assert!(contains_phrase("Hello Mirror", "hello"));
        assert!(!contains_phrase("goodbye", "hello"));
    }
}
