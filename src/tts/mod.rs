//! Text-to-Speech Synthesizer — turns reply text into a playable WAV file.
//!
//! Synthesis itself is delegated to a remote collaborator; this module
//! owns the policy wrapped around it: word-count capping for chat replies
//! and writing the returned audio to a predictable temp-file slot so the
//! Audio Sink can play it back.

use crate::constants::CHAT_REPLY_MAX_WORDS;
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub wav_bytes: Vec<u8>,
    pub sample_rate: u32,
}

/// Text-to-speech collaborator contract.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<TtsAudio>;
}

#[async_trait]
impl TtsClient for Box<dyn TtsClient> {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<TtsAudio> {
        (**self).synthesize(text, voice).await
    }
}

pub struct Synthesizer<'a, C: TtsClient> {
    client: &'a C,
    voice: String,
    output_dir: PathBuf,
}

impl<'a, C: TtsClient> Synthesizer<'a, C> {
    pub fn new(client: &'a C, voice: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self { client, voice: voice.into(), output_dir: output_dir.into() }
    }

    /// Synthesize `text` (already capped to [`CHAT_REPLY_MAX_WORDS`] by the
    /// caller for chat replies) and write it to `file_name` under the
    /// configured output directory, returning the path.
    pub async fn synthesize_to_file(&self, text: &str, file_name: &str) -> Result<PathBuf> {
        let capped = cap_words(text, CHAT_REPLY_MAX_WORDS);
        let audio = self.client.synthesize(&capped, &self.voice).await?;
        let path = self.output_dir.join(file_name);
        std::fs::write(&path, &audio.wav_bytes).map_err(MirrorError::Io)?;
        Ok(path)
    }
}

fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().take(max_words).collect();
    words.join(" ")
}

/// Validates that a path produced by synthesis is a well-formed WAV file
/// before handing it to the Audio Sink (defensive check against a
/// collaborator returning malformed audio).
pub fn validate_wav(path: &Path) -> Result<()> {
    hound::WavReader::open(path).map(|_| ()).map_err(|e| MirrorError::DecodeFailure(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FixedTts;

    #[async_trait]
    impl TtsClient for FixedTts {
        async fn synthesize(&self, text: &str, _voice: &str) -> Result<TtsAudio> {
            let mut buf = Vec::new();
            {
                let spec = hound::WavSpec {
                    channels: 1,
                    sample_rate: 22_050,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut buf), spec).unwrap();
                for _ in 0..text.len() {
                    writer.write_sample(0i16).unwrap();
                }
                writer.finalize().unwrap();
            }
            Ok(TtsAudio { wav_bytes: buf, sample_rate: 22_050 })
        }
    }

    #[tokio::test]
    async fn synthesize_to_file_caps_reply_and_writes_valid_wav() {
        let dir = tempdir().unwrap();
        let client = FixedTts;
        let synth = Synthesizer::new(&client, "default", dir.path());
        let long_text = (0..50).map(|_| "word").collect::<Vec<_>>().join(" ");
        let path = synth.synthesize_to_file(&long_text, "reply.wav").await.unwrap();
        assert!(validate_wav(&path).is_ok());
    }

    #[test]
    fn cap_words_truncates_to_limit() {
        let text = (0..40).map(|_| "x").collect::<Vec<_>>().join(" ");
        let capped = cap_words(&text, 30);
        assert_eq!(capped.split_whitespace().count(), 30);
    }

    #[test]
    fn validate_wav_rejects_non_wav_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not_wav.wav");
        std::fs::write(&path, b"not a wav file").unwrap();
        assert!(validate_wav(&path).is_err());
    }
}
