//! News Streamer — fetches a fixed-size batch of headlines, synthesizes
//! and plays each in turn with a double-buffered file slot.
//!
//! Synthesis and playback are serialized: headline N+1 is synthesized
//! only after headline N has finished playing. A double buffer would let
//! synthesis of N+1 overlap with N's playback, but this implementation
//! keeps the simpler serialized contract, so the two file slots are
//! simply alternated per headline rather than used for concurrent
//! synth+play.

use crate::constants::NEWS_HEADLINE_COUNT;
use crate::error::Result;
use crate::tts::{Synthesizer, TtsClient};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Headline {
    pub title: String,
    pub summary: String,
}

/// News source collaborator contract.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_headlines(&self, count: usize) -> Result<Vec<Headline>>;
}

/// Two alternating file slots so the Audio Sink never reads a file that a
/// subsequent synthesis step is still writing.
pub struct NewsBuffer {
    slots: [PathBuf; 2],
}

impl NewsBuffer {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        let dir = temp_dir.into();
        Self { slots: [dir.join("news_slot_0.wav"), dir.join("news_slot_1.wav")] }
    }

    pub fn slot(&self, index: usize) -> &std::path::Path {
        &self.slots[index % 2]
    }
}

#[async_trait]
impl NewsSource for Box<dyn NewsSource> {
    async fn fetch_headlines(&self, count: usize) -> Result<Vec<Headline>> {
        (**self).fetch_headlines(count).await
    }
}

pub struct NewsStreamer<'a, N: NewsSource, C: TtsClient> {
    source: &'a N,
    synthesizer: Synthesizer<'a, C>,
    sink: Arc<crate::audio::AudioSink>,
    buffer: NewsBuffer,
    ui: Arc<dyn crate::ui::UiSurface>,
}

impl<'a, N: NewsSource, C: TtsClient> NewsStreamer<'a, N, C> {
    pub fn new(
        source: &'a N,
        synthesizer: Synthesizer<'a, C>,
        sink: Arc<crate::audio::AudioSink>,
        buffer: NewsBuffer,
        ui: Arc<dyn crate::ui::UiSurface>,
    ) -> Self {
        Self { source, synthesizer, sink, buffer, ui }
    }

    /// Runs one full news cycle: fetch up to [`NEWS_HEADLINE_COUNT`]
    /// headlines, then synthesize and play them one at a time, checking
    /// `cancel` between headlines so the cycle can be preempted by a wake
    /// word or an incoming call during playback.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<usize> {
        let headlines = self.source.fetch_headlines(NEWS_HEADLINE_COUNT).await?;
        if headlines.is_empty() {
            info!("no headlines available for this news cycle");
            return Ok(0);
        }

        let mut played = 0;
        for (index, headline) in headlines.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            // `playing_index` changed since the previous tick: update the UI title (spec §4.8 step 2).
            self.ui.on_event(crate::ui::UiEvent::NewsTitleUpdated { title: headline.title.clone() });

            let slot = self.buffer.slot(index);
            let file_name = slot.file_name().and_then(|n| n.to_str()).unwrap_or("news.wav").to_string();
            let text = format!("{}. {}", headline.title, headline.summary);

            let path = match self.synthesizer.synthesize_to_file(&text, &file_name).await {
                Ok(path) => path,
                Err(e) => {
                    warn!("failed to synthesize headline {index}: {e}");
                    continue;
                }
            };

            if cancel.is_cancelled() {
                break;
            }

            let sink = self.sink.clone();
            let play_path = path.clone();
            let blocking_result =
                tokio::task::spawn_blocking(move || sink.play(&play_path, true, crate::audio::sink::NEWS_RATE_SCALE))
                    .await;
            match blocking_result {
                Ok(Ok(())) => played += 1,
                Ok(Err(e)) => warn!("failed to play headline {index}: {e}"),
                Err(e) => warn!("playback task panicked for headline {index}: {e}"),
            }
        }
        Ok(played)
    }
}
