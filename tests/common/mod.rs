//! Shared fixtures for the Orchestrator integration tests: stub
//! collaborators plus a small assembly helper so each scenario only has to
//! state what's different about it.

use async_trait::async_trait;
use mirror_core::asr::{AsrEvent, StreamingAsrClient};
use mirror_core::audio::{AudioFrame, AudioFrameQueue, AudioSink, AudioSource};
use mirror_core::config::AppConfig;
use mirror_core::error::Result;
use mirror_core::intent::actions::{
    extract_music_preset, Action, ActionRegistry, MusicAction, MusicTrigger, NewsAction, NewsTrigger, RegisteredAction,
};
use mirror_core::intent::{ChatClient, ChatReply};
use mirror_core::music::{MusicPlayer, MusicSearch, TrackInfo};
use mirror_core::news::{Headline, NewsSource};
use mirror_core::orchestrator::Orchestrator;
use mirror_core::state::State;
use mirror_core::tts::{TtsAudio, TtsClient};
use mirror_core::ui::{UiEvent, UiSurface};
use mirror_core::wake::{ScriptedRecognizer, WakeRecognizer};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Records every `ModeChanged` event in order, for asserting a scenario's
/// state sequence without racing on `current_state()` between transitions.
#[derive(Default)]
pub struct CapturingUi {
    states: Mutex<Vec<State>>,
}

impl CapturingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self) -> Vec<State> {
        self.states.lock().unwrap().clone()
    }
}

impl UiSurface for CapturingUi {
    fn on_event(&self, event: UiEvent) {
        if let UiEvent::ModeChanged { state } = event {
            self.states.lock().unwrap().push(state);
        }
    }
}

/// Sends one `Final` transcript as soon as the Streaming Recognizer asks for
/// it, exercising the "early-stop on non-empty final" rule instead of
/// waiting out a real initial-wait window.
pub struct ImmediateFinalAsr(pub &'static str);

#[async_trait]
impl StreamingAsrClient for ImmediateFinalAsr {
    async fn recognize(&self, _frames: mpsc::Receiver<AudioFrame>) -> mpsc::Receiver<AsrEvent> {
        let (tx, rx) = mpsc::channel(4);
        let text = self.0.to_string();
        tokio::spawn(async move {
            let _ = tx
                .send(AsrEvent::Final { text, confidence: 0.95, language_code: "en-US".into(), alternatives: vec![] })
                .await;
        });
        rx
    }
}

/// Never sends a transcript and never closes its channel, keeping a
/// Listening cycle open indefinitely so a test can preempt it deliberately.
pub struct PendingAsr;

#[async_trait]
impl StreamingAsrClient for PendingAsr {
    async fn recognize(&self, _frames: mpsc::Receiver<AudioFrame>) -> mpsc::Receiver<AsrEvent> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        rx
    }
}

pub struct FixedChat(pub &'static str);

#[async_trait]
impl ChatClient for FixedChat {
    async fn ask(&self, _prompt: &str, _system_prompt: &str) -> Result<ChatReply> {
        Ok(ChatReply { text: self.0.into(), tokens_used: 12, model: "stub".into() })
    }
}

pub struct FailingChat;

#[async_trait]
impl ChatClient for FailingChat {
    async fn ask(&self, _prompt: &str, _system_prompt: &str) -> Result<ChatReply> {
        Err(mirror_core::error::MirrorError::NetworkTransient("stub chat endpoint unreachable".into()))
    }
}

pub struct SilentTts;

#[async_trait]
impl TtsClient for SilentTts {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<TtsAudio> {
        let sample_rate = 22_050;
        let mut buf = Vec::new();
        let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut buf), spec).unwrap();
        for _ in 0..text.split_whitespace().count().max(1) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        Ok(TtsAudio { wav_bytes: buf, sample_rate })
    }
}

pub struct FixedHeadlines(pub Vec<Headline>);

#[async_trait]
impl NewsSource for FixedHeadlines {
    async fn fetch_headlines(&self, count: usize) -> Result<Vec<Headline>> {
        Ok(self.0.iter().take(count).cloned().collect())
    }
}

struct UnreachableSearch;

#[async_trait]
impl MusicSearch for UnreachableSearch {
    async fn search(&self, preset: &str) -> Result<TrackInfo> {
        Ok(TrackInfo { title: preset.into(), artist: "Stub".into(), download_url: "http://127.0.0.1:0/unreachable".into() })
    }
}

/// Mirrors the binary's `MusicTriggerHandle`: forwards to the same
/// `MusicPlayer` instance the Orchestrator polls, so the "already started"
/// assumption in `run_action`'s music branch holds in tests too.
struct TestMusicTrigger {
    player: Arc<MusicPlayer<Box<dyn MusicSearch>>>,
}

#[async_trait]
impl MusicTrigger for TestMusicTrigger {
    async fn start_preset(&self, preset: &str) -> Result<()> {
        self.player.start_preset(preset).await
    }
}

#[derive(Default)]
struct NoopNewsTrigger;

#[async_trait]
impl NewsTrigger for NoopNewsTrigger {
    async fn start_cycle(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub ui: Arc<CapturingUi>,
    pub queue: AudioFrameQueue,
    pub input_tx: mpsc::Sender<mirror_core::orchestrator::InputEvent>,
    pub input_rx: Option<mpsc::Receiver<mirror_core::orchestrator::InputEvent>>,
    pub call_tx: mpsc::Sender<mirror_core::call::CallEvent>,
    pub call_rx: Option<mpsc::Receiver<mirror_core::call::CallEvent>>,
    pub _temp_dir: tempfile::TempDir,
}

/// Assembles an `Orchestrator` wired with the given wake/ASR/chat/news
/// collaborators and a `news`/`music` action registry (the same pattern
/// and action names `main.rs` wires up, minus `weather` which no scenario
/// here exercises), ready to have its `run` loop spawned by the caller.
pub fn build_harness(
    wake_script: Vec<String>,
    asr_client: Box<dyn StreamingAsrClient>,
    chat_client: Box<dyn ChatClient>,
    news_source: Box<dyn NewsSource>,
) -> Harness {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        install_root: temp_dir.path().to_path_buf(),
        wake_phrase: "hello".into(),
        asr_credentials_path: None,
        wake_model_path: None,
        chat_api_key: None,
        chat_api_url: None,
        music_api_key: None,
        tls_cert_path: None,
        tls_key_path: None,
    };
    std::fs::create_dir_all(config.temp_audio_dir()).unwrap();
    std::fs::create_dir_all(config.resources_dir().join("bgm")).unwrap();

    let queue = AudioFrameQueue::new(8);
    let audio_source = Arc::new(AudioSource::new(queue.clone(), None));
    let audio_sink = Arc::new(AudioSink::new());

    let ui = CapturingUi::new();

    let music_search: Box<dyn MusicSearch> = Box::new(UnreachableSearch);
    let music_player = Arc::new(MusicPlayer::new(
        music_search,
        audio_sink.clone(),
        config.temp_audio_dir(),
        config.resources_dir().join("bgm"),
        ui.clone() as Arc<dyn UiSurface>,
    ));

    let mut registry = ActionRegistry::new();
    registry.register(RegisteredAction {
        name: "news".into(),
        patterns: vec![Regex::new(r"\bnews\b").unwrap(), Regex::new(r"headlines").unwrap()],
        canonical_reply: "Here's the latest news.".into(),
        extract: |_| HashMap::new(),
        action: Box::new(NewsAction::new(NoopNewsTrigger)) as Box<dyn Action>,
    });
    registry.register(RegisteredAction {
        name: "music".into(),
        patterns: vec![Regex::new(r"music").unwrap(), Regex::new(r"\bplay\b").unwrap()],
        canonical_reply: "Starting some music.".into(),
        extract: extract_music_preset,
        action: Box::new(MusicAction::new(TestMusicTrigger { player: music_player.clone() })) as Box<dyn Action>,
    });

    let wake_recognizer: Box<dyn WakeRecognizer> = Box::new(ScriptedRecognizer::new(wake_script));

    let orchestrator = Orchestrator::new(
        config,
        ui.clone() as Arc<dyn UiSurface>,
        audio_source,
        audio_sink,
        queue.clone(),
        wake_recognizer,
        asr_client,
        chat_client,
        Box::new(SilentTts),
        registry,
        music_player,
        news_source,
    );

    let (input_tx, input_rx) = mpsc::channel(16);
    let (call_tx, call_rx) = mpsc::channel(16);

    Harness {
        orchestrator,
        ui,
        queue,
        input_tx,
        input_rx: Some(input_rx),
        call_tx,
        call_rx: Some(call_rx),
        _temp_dir: temp_dir,
    }
}

/// Pushes a single dummy frame so the Wake Detector's first `queue.pop()`
/// has something to hand the scripted recognizer.
pub fn push_dummy_frame(queue: &AudioFrameQueue) {
    queue.push(AudioFrame { samples: vec![0; 10], sample_rate: 16_000 });
}

/// Polls `current_state()` until it equals `target` or `bound` elapses,
/// panicking with the last observed state on timeout.
pub async fn wait_for_state(orchestrator: &Arc<Orchestrator>, target: State, bound: Duration) {
    let result = tokio::time::timeout(bound, async {
        loop {
            if orchestrator.current_state() == target {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {target:?}, last seen {:?}", orchestrator.current_state());
}
