//! Binary entrypoint: loads configuration, wires collaborators, and runs
//! the Orchestrator's tick loop until `Q`/`Esc`.
//!
//! The binary takes no arguments; all configuration comes from the
//! environment (see [`mirror_core::config`]). Runtime control is line-
//! based on stdin in this headless build: an empty line is `Enter`
//! (cancels Music/News), `q`/`Q` quits. A full terminal-raw-mode reader is
//! left to the platform-specific shell that embeds this core.

use async_trait::async_trait;
use mirror_core::asr::{AsrEvent, StreamingAsrClient};
use mirror_core::audio::{AudioFrameQueue, AudioSink, AudioSource};
use mirror_core::call::CallGateway;
use mirror_core::config::AppConfig;
use mirror_core::constants::CAPTURE_QUEUE_CAPACITY;
use mirror_core::error::{MirrorError, Result};
use mirror_core::intent::actions::{
    extract_music_preset, extract_weather_location, Action, ActionRegistry, MusicTrigger, NewsTrigger, RegisteredAction,
    WeatherAction, WeatherClient, WeatherReport,
};
use mirror_core::intent::{ChatClient, ChatReply};
use mirror_core::music::{MusicPlayer, MusicSearch, TrackInfo};
use mirror_core::news::{Headline, NewsSource};
use mirror_core::orchestrator::{InputEvent, Orchestrator};
use mirror_core::tts::{TtsAudio, TtsClient};
use mirror_core::ui::{NullUiSurface, UiEvent, UiSurface};
use mirror_core::wake::WakeRecognizer;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    mirror_core::logging::init();
    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(config.temp_audio_dir()).map_err(MirrorError::Io)?;
    let tls_cert_path = config.tls_cert_path.clone();
    let tls_key_path = config.tls_key_path.clone();

    let queue = AudioFrameQueue::new(CAPTURE_QUEUE_CAPACITY);
    let audio_source = Arc::new(AudioSource::new(queue.clone(), None));
    audio_source.start()?;
    let audio_sink = Arc::new(AudioSink::new());

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {e}")))?;

    let ui: Arc<dyn UiSurface> = Arc::new(NullUiSurface);

    let music_search: Box<dyn MusicSearch> = Box::new(HttpMusicSearch::new(http.clone(), config.music_api_key.clone()));
    let music_player = Arc::new(MusicPlayer::new(
        music_search,
        audio_sink.clone(),
        config.temp_audio_dir(),
        config.resources_dir().join("bgm"),
        ui.clone(),
    ));

    let weather_client = HttpWeatherClient::new(http.clone());
    let home_location = "Seattle";
    match weather_client.current(home_location).await {
        Ok(report) => ui.on_event(UiEvent::WeatherUpdated {
            temperature_f: report.temperature_f,
            condition: report.condition,
            location: report.location,
        }),
        Err(e) => error!("startup weather fetch failed: {e}"),
    }

    let mut registry = ActionRegistry::new();
    registry.register(RegisteredAction {
        name: "weather".into(),
        patterns: vec![Regex::new(r"weather").unwrap()],
        canonical_reply: "Let me check the weather.".into(),
        extract: extract_weather_location,
        action: Box::new(WeatherAction::new(HttpWeatherClient::new(http.clone()), home_location)),
    });
    registry.register(RegisteredAction {
        name: "news".into(),
        patterns: vec![Regex::new(r"\bnews\b").unwrap(), Regex::new(r"headlines").unwrap()],
        canonical_reply: "Here's the latest news.".into(),
        extract: |_| HashMap::new(),
        action: Box::new(mirror_core::intent::actions::NewsAction::new(NewsTriggerHandle::default())),
    });
    registry.register(RegisteredAction {
        name: "music".into(),
        patterns: vec![Regex::new(r"music").unwrap(), Regex::new(r"\bplay\b").unwrap()],
        canonical_reply: "Starting some music.".into(),
        extract: extract_music_preset,
        action: Box::new(mirror_core::intent::actions::MusicAction::new(MusicTriggerHandle { player: music_player.clone() })),
    });

    let news_source: Box<dyn NewsSource> = Box::new(StubNewsSource);
    let chat_client: Box<dyn ChatClient> = Box::new(HttpChatClient::new(http.clone(), config.chat_api_key.clone(), config.chat_api_url.clone()));
    let tts_client: Box<dyn TtsClient> = Box::new(NullTtsClient);
    let asr_client: Box<dyn StreamingAsrClient> = Box::new(NullAsrClient);
    let wake_recognizer: Box<dyn WakeRecognizer> = Box::new(NullWakeRecognizer);

    let orchestrator = Orchestrator::new(
        config,
        ui,
        audio_source,
        audio_sink,
        queue,
        wake_recognizer,
        asr_client,
        chat_client,
        tts_client,
        registry,
        music_player,
        news_source,
    );

    let (input_tx, input_rx) = mpsc::channel(16);
    let (call_tx, call_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    spawn_stdin_reader(input_tx);
    let mut gateway = CallGateway::new(call_tx);
    if let (Some(cert), Some(key)) = (&tls_cert_path, &tls_key_path) {
        gateway = gateway.with_tls(cert, key)?;
    }
    let gateway = Arc::new(gateway);
    let gateway_cancel = cancel.child_token();
    tokio::spawn(async move {
        if let Err(e) = gateway.listen(([0, 0, 0, 0], 9443).into(), gateway_cancel).await {
            error!("call gateway failed: {e}");
        }
    });

    info!("mirror-core starting");
    orchestrator.run(input_rx, call_rx, cancel).await;
    Ok(())
}

fn spawn_stdin_reader(input_tx: mpsc::Sender<InputEvent>) {
    std::thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let trimmed = line.trim();
            let event = if trimmed.eq_ignore_ascii_case("q") {
                Some(InputEvent::Quit)
            } else if trimmed.is_empty() {
                Some(InputEvent::Enter)
            } else {
                None
            };
            if let Some(event) = event {
                if input_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        }
    });
}

/// Generic HTTPS JSON chat completion client.
struct HttpChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: Option<String>,
}

impl HttpChatClient {
    fn new(http: reqwest::Client, api_key: Option<String>, api_url: Option<String>) -> Self {
        Self { http, api_key, api_url }
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn ask(&self, prompt: &str, system_prompt: &str) -> Result<ChatReply> {
        let url = self.api_url.as_deref().ok_or_else(|| MirrorError::Config("MIRROR_CHAT_API_URL not set".into()))?;
        let mut request = self.http.post(url).json(&serde_json::json!({
            "prompt": prompt,
            "system_prompt": system_prompt,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        let body: ChatResponseBody = response.json().await.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        Ok(ChatReply { text: body.text, tokens_used: body.tokens_used, model: body.model })
    }
}

#[derive(serde::Deserialize)]
struct ChatResponseBody {
    text: String,
    #[serde(default)]
    tokens_used: u32,
    #[serde(default)]
    model: String,
}

/// Weather fetch helper; a concrete forecast provider is out of scope,
/// so this adapter assumes a simple JSON endpoint shaped after the
/// `WeatherClient` contract.
struct HttpWeatherClient {
    http: reqwest::Client,
}

impl HttpWeatherClient {
    fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WeatherClient for HttpWeatherClient {
    async fn current(&self, location: &str) -> Result<WeatherReport> {
        let url = std::env::var("MIRROR_WEATHER_API_URL").map_err(|_| MirrorError::Config("MIRROR_WEATHER_API_URL not set".into()))?;
        let response = self
            .http
            .get(&url)
            .query(&[("location", location)])
            .send()
            .await
            .map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        let body: WeatherResponseBody = response.json().await.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        Ok(WeatherReport { location: body.location, temperature_f: body.temperature, condition: body.condition })
    }
}

#[derive(serde::Deserialize)]
struct WeatherResponseBody {
    temperature: f32,
    condition: String,
    location: String,
}

/// Music search helper: a minimal adapter over whatever remote catalog
/// API the deployment points it at. Resolving a real catalog is left to
/// that deployment; this just shapes the HTTP call.
struct HttpMusicSearch {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl HttpMusicSearch {
    fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl MusicSearch for HttpMusicSearch {
    async fn search(&self, query: &str) -> Result<TrackInfo> {
        let url = std::env::var("MIRROR_MUSIC_API_URL").map_err(|_| MirrorError::Config("MIRROR_MUSIC_API_URL not set".into()))?;
        let mut request = self.http.get(&url).query(&[("q", query), ("limit", "1")]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        let mut tracks: Vec<MusicTrackBody> = response.json().await.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        let track = tracks
            .pop()
            .ok_or_else(|| MirrorError::NetworkTransient(format!("no tracks found for '{query}'")))?;
        Ok(TrackInfo { title: track.name, artist: track.artist, download_url: track.audio_url })
    }
}

#[derive(serde::Deserialize)]
struct MusicTrackBody {
    name: String,
    artist: String,
    audio_url: String,
}

/// Fixed fallback headlines used when no real RSS integration is
/// configured.
struct StubNewsSource;

#[async_trait]
impl NewsSource for StubNewsSource {
    async fn fetch_headlines(&self, _count: usize) -> Result<Vec<Headline>> {
        Ok(Vec::new())
    }
}

/// Placeholder TTS client: vendor synthesis protocols are explicitly out
/// of scope. Produces silence so the pipeline still exercises
/// its file-handling and playback-rate logic end to end.
struct NullTtsClient;

#[async_trait]
impl TtsClient for NullTtsClient {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<TtsAudio> {
        let sample_rate = 22_050;
        let sample_count = (text.split_whitespace().count().max(1) * sample_rate as usize) / 3;
        let mut buf = Vec::new();
        {
            let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
            let mut writer =
                hound::WavWriter::new(std::io::Cursor::new(&mut buf), spec).map_err(|e| MirrorError::DecodeFailure(e.to_string()))?;
            for _ in 0..sample_count {
                writer.write_sample(0i16).map_err(|e| MirrorError::DecodeFailure(e.to_string()))?;
            }
            writer.finalize().map_err(|e| MirrorError::DecodeFailure(e.to_string()))?;
        }
        Ok(TtsAudio { wav_bytes: buf, sample_rate })
    }
}

/// Placeholder remote streaming ASR: vendor protocols are explicitly out
/// of scope. Closes its event stream immediately, which the
/// Streaming Recognizer's timing rules interpret as "no speech" (empty
/// result after the initial wait).
struct NullAsrClient;

#[async_trait]
impl StreamingAsrClient for NullAsrClient {
    async fn recognize(&self, _frames: mpsc::Receiver<mirror_core::audio::AudioFrame>) -> mpsc::Receiver<AsrEvent> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

/// Placeholder local wake recognizer: the keyword-spotter model itself is
/// out of scope. Never detects, so this build only activates on
/// an incoming call, never on voice.
struct NullWakeRecognizer;

impl WakeRecognizer for NullWakeRecognizer {
    fn reset(&mut self) {}
    fn accept(&mut self, _samples: &[i16]) -> Option<String> {
        None
    }
    fn partial(&self) -> Option<String> {
        None
    }
}

/// Forwards the Music action's trigger to the same [`MusicPlayer`] instance
/// the Orchestrator polls via `State::Music` — the action and the
/// Orchestrator must share one player so `run_action`'s "already started"
/// assumption for the `"music"` action name holds.
struct MusicTriggerHandle {
    player: Arc<MusicPlayer<Box<dyn MusicSearch>>>,
}

#[async_trait]
impl MusicTrigger for MusicTriggerHandle {
    async fn start_preset(&self, preset: &str) -> Result<()> {
        self.player.start_preset(preset).await
    }
}

/// The News action's trigger is a no-op: the Orchestrator drives the real
/// fetch/synth/play cycle itself via `begin_news_cycle` once this action
/// returns (see `mirror_core::orchestrator::Orchestrator::run_action`),
/// since the News Streamer needs the Orchestrator's own cancellation token
/// and task-tracking, neither of which an `Action` has access to.
#[derive(Default)]
struct NewsTriggerHandle;

#[async_trait]
impl NewsTrigger for NewsTriggerHandle {
    async fn start_cycle(&self) -> Result<()> {
        Ok(())
    }
}
