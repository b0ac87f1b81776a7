//! Orchestrator — owns the state machine and the 60 Hz tick loop.
//!
//! Every per-state handler is non-blocking: it either spawns a background
//! task (tracked in `tasks`, one slot per [`TaskKind`]) or performs truly
//! synchronous work (the Acting handler's action execution). Background
//! tasks hold their own `Arc<Orchestrator>` clone and
//! call back into `handle_*` methods directly on completion rather than
//! routing through a shared channel — the tick loop itself only ever
//! drives state *entry*, never blocks waiting on a task.

pub mod tasks;

use crate::asr::{AsrResult, StreamingAsrClient, StreamingRecognizer};
use crate::audio::{AudioFrameQueue, AudioSink, AudioSource};
use crate::call::CallEvent;
use crate::config::AppConfig;
use crate::constants::{TICK_INTERVAL, WAKE_LOOP_RETRY_BACKOFF};
use crate::intent::actions::ActionRegistry;
use crate::intent::{ChatClient, Intent, IntentKind, IntentRouter};
use crate::music::{MusicPlayer, MusicSearch};
use crate::news::{NewsBuffer, NewsSource, NewsStreamer};
use crate::state::{NewsProgress, SpeakingResume, State, StateContext};
use crate::tts::{Synthesizer, TtsClient};
use crate::ui::{UiEvent, UiSurface};
use crate::wake::{WakeDetector, WakeRecognizer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tasks::{TaskHandle, TaskKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub enum InputEvent {
    Quit,
    Enter,
}

pub struct Orchestrator {
    config: AppConfig,
    state: Mutex<StateContext>,
    tasks: Mutex<HashMap<TaskKind, TaskHandle>>,
    frame_queue: AudioFrameQueue,
    audio_source: Arc<AudioSource>,
    audio_sink: Arc<AudioSink>,
    ui: Arc<dyn UiSurface>,
    wake_phrase: String,
    wake_recognizer: Mutex<Option<Box<dyn WakeRecognizer>>>,
    asr_client: Box<dyn StreamingAsrClient>,
    chat_client: Box<dyn ChatClient>,
    tts_client: Box<dyn TtsClient>,
    action_registry: ActionRegistry,
    music_player: Arc<MusicPlayer<Box<dyn MusicSearch>>>,
    news_source: Box<dyn NewsSource>,
}

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    pub fn new(
        config: AppConfig,
        ui: Arc<dyn UiSurface>,
        audio_source: Arc<AudioSource>,
        audio_sink: Arc<AudioSink>,
        frame_queue: AudioFrameQueue,
        wake_recognizer: Box<dyn WakeRecognizer>,
        asr_client: Box<dyn StreamingAsrClient>,
        chat_client: Box<dyn ChatClient>,
        tts_client: Box<dyn TtsClient>,
        action_registry: ActionRegistry,
        music_player: Arc<MusicPlayer<Box<dyn MusicSearch>>>,
        news_source: Box<dyn NewsSource>,
    ) -> Arc<Self> {
        let wake_phrase = config.wake_phrase.clone();
        Arc::new(Self {
            config,
            state: Mutex::new(StateContext::Idle),
            tasks: Mutex::new(HashMap::new()),
            frame_queue,
            audio_source,
            audio_sink,
            ui,
            wake_phrase,
            wake_recognizer: Mutex::new(Some(wake_recognizer)),
            asr_client,
            chat_client,
            tts_client,
            action_registry,
            music_player,
            news_source,
        })
    }

    pub fn current_state(&self) -> State {
        self.state.lock().state()
    }

    fn set_state(&self, ctx: StateContext) {
        let state = ctx.state();
        *self.state.lock() = ctx;
        self.ui.on_event(UiEvent::ModeChanged { state });
    }

    fn task_running(&self, kind: TaskKind) -> bool {
        self.tasks.lock().get(&kind).map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn store_task(&self, kind: TaskKind, task: TaskHandle) {
        self.tasks.lock().insert(kind, task);
    }

    fn cancel_task(&self, kind: TaskKind) {
        if let Some(task) = self.tasks.lock().remove(&kind) {
            task.cancel();
        }
    }

    /// Runs the 60 Hz tick loop until an [`InputEvent::Quit`] or `cancel`
    /// fires.
    pub async fn run(self: Arc<Self>, mut input_rx: mpsc::Receiver<InputEvent>, mut call_rx: mpsc::Receiver<CallEvent>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("orchestrator shutting down");
                    return;
                }
                Some(input) = input_rx.recv() => {
                    if self.clone().handle_input(input).await {
                        return;
                    }
                }
                Some(call_event) = call_rx.recv() => {
                    self.clone().handle_call_event(call_event).await;
                }
                _ = interval.tick() => {
                    self.clone().drive_current_state();
                }
            }
        }
    }

    /// Returns `true` if the caller should stop the loop.
    async fn handle_input(self: Arc<Self>, input: InputEvent) -> bool {
        match input {
            InputEvent::Quit => {
                info!("quit requested");
                true
            }
            InputEvent::Enter => {
                let state = self.current_state();
                if matches!(state, State::Music | State::News) {
                    self.cancel_task(TaskKind::Music);
                    self.cancel_task(TaskKind::NewsPlay);
                    self.cancel_task(TaskKind::NewsTts);
                    self.music_player.stop().await;
                    self.audio_sink.stop();
                    if state == State::Music {
                        if let Err(e) = self.audio_source.reinitialize() {
                            error!("failed to reinitialize audio source after music: {e}");
                        }
                    } else {
                        self.audio_source.clear_buffer();
                    }
                    self.set_state(StateContext::Idle);
                }
                false
            }
        }
    }

    /// Spawns the background task appropriate to the current state, if one
    /// isn't already running. Handlers are non-blocking: they schedule
    /// background tasks rather than doing the work inline.
    fn drive_current_state(self: Arc<Self>) {
        match self.current_state() {
            State::Idle => self.enter_idle(),
            State::Listening => self.enter_listening(),
            State::Thinking => self.enter_thinking(),
            State::Music => self.poll_music(),
            State::News | State::Acting | State::Chatting | State::Speaking | State::Calling => {}
        }
    }

    fn enter_idle(self: Arc<Self>) {
        if self.task_running(TaskKind::Wake) {
            return;
        }
        let orch = self.clone();
        let task = TaskHandle::spawn(move |cancel| {
            tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let recognizer = match orch.wake_recognizer.lock().take() {
                        Some(r) => r,
                        None => return,
                    };
                    let mut detector = WakeDetector::new(orch.wake_phrase.clone(), recognizer);
                    let detected = detector.run(&orch.frame_queue, &cancel).await;
                    *orch.wake_recognizer.lock() = Some(detector.into_recognizer());

                    if cancel.is_cancelled() {
                        return;
                    }
                    if detected {
                        orch.set_state(StateContext::Listening { started_at: std::time::Instant::now() });
                        return;
                    }
                    warn!("wake loop exited without detection or cancellation; retrying after backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(WAKE_LOOP_RETRY_BACKOFF) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
            })
        });
        self.store_task(TaskKind::Wake, task);
    }

    fn enter_listening(self: Arc<Self>) {
        if self.task_running(TaskKind::Think) {
            return;
        }
        let orch = self.clone();
        let task = TaskHandle::spawn(move |cancel| {
            tokio::spawn(async move {
                let recognizer = StreamingRecognizer::new(&*orch.asr_client);
                let persist_path = orch.config.last_transcript_path();
                let result = recognizer.run(&orch.frame_queue, Some(&persist_path), &cancel).await;
                if !cancel.is_cancelled() {
                    orch.on_transcript(result);
                }
            })
        });
        self.store_task(TaskKind::Think, task);
    }

    fn on_transcript(&self, result: AsrResult) {
        if result.is_empty() {
            self.set_state(StateContext::Idle);
        } else {
            self.set_state(StateContext::Thinking { transcript: result.text });
        }
    }

    fn enter_thinking(self: Arc<Self>) {
        let transcript = match &*self.state.lock() {
            StateContext::Thinking { transcript } => transcript.clone(),
            _ => return,
        };
        if self.task_running(TaskKind::Think) {
            return;
        }
        let orch = self.clone();
        let task = TaskHandle::spawn(move |cancel| {
            tokio::spawn(async move {
                let router = IntentRouter::new(&orch.action_registry, &*orch.chat_client);
                let intent = router.route(&transcript).await;
                if !cancel.is_cancelled() {
                    orch.clone().handle_intent(intent).await;
                }
            })
        });
        self.store_task(TaskKind::Think, task);
    }

    fn poll_music(&self) {
        if !self.music_player.is_playing() {
            if let Err(e) = self.audio_source.reinitialize() {
                error!("failed to reinitialize audio source after music: {e}");
            }
            self.set_state(StateContext::Idle);
        }
    }

    async fn handle_intent(self: Arc<Self>, intent: Intent) {
        match intent.kind {
            IntentKind::Chat => {
                self.set_state(StateContext::Chatting { intent: intent.clone() });
                self.spawn_chat_synthesis(intent);
            }
            IntentKind::Predefined => {
                self.set_state(StateContext::Acting { intent: intent.clone() });
                self.run_action(intent).await;
            }
        }
    }

    async fn run_action(self: Arc<Self>, intent: Intent) {
        let Some(action_name) = intent.action_name.clone() else {
            self.set_state(StateContext::Idle);
            return;
        };
        let Some(action) = self.action_registry.get(&action_name) else {
            warn!("no action registered for '{action_name}'");
            self.set_state(StateContext::Idle);
            return;
        };
        match action.action.execute(&intent.action_params).await {
            Ok(result) => {
                if action_name == "music" {
                    // The action already kicked off the Music Player's own
                    // background task; release the microphone before
                    // reflecting the new state so the two never overlap.
                    self.audio_source.stop();
                    self.set_state(StateContext::Music { query: action_name });
                } else if action_name == "news" {
                    self.set_state(StateContext::Speaking {
                        audio_path: self.config.news_headlines_intro_path(),
                        resume_to: SpeakingResume::News,
                    });
                    self.clone().spawn_speaking();
                } else {
                    let reply_text = result.reply_text.unwrap_or(intent.reply_text);
                    let spoken_intent = Intent { reply_text, ..intent };
                    self.set_state(StateContext::Chatting { intent: spoken_intent.clone() });
                    self.spawn_chat_synthesis(spoken_intent);
                }
            }
            Err(e) => {
                error!("action '{action_name}' failed: {e}");
                self.set_state(StateContext::Idle);
            }
        }
    }

    fn spawn_chat_synthesis(self: Arc<Self>, intent: Intent) {
        let orch = self.clone();
        let task = TaskHandle::spawn(move |cancel| {
            tokio::spawn(async move {
                let dir = orch.config.temp_audio_dir();
                let synth = Synthesizer::new(&*orch.tts_client, "default", dir);
                match synth.synthesize_to_file(&intent.reply_text, "chat_reply.wav").await {
                    Ok(path) if !cancel.is_cancelled() => {
                        orch.set_state(StateContext::Speaking { audio_path: path, resume_to: SpeakingResume::Idle });
                        orch.clone().spawn_speaking();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("chat synthesis failed: {e}");
                        orch.set_state(StateContext::Idle);
                    }
                }
            })
        });
        self.store_task(TaskKind::Speak, task);
    }

    fn spawn_speaking(self: Arc<Self>) {
        let path = match &*self.state.lock() {
            StateContext::Speaking { audio_path, .. } => audio_path.clone(),
            _ => return,
        };
        let orch = self.clone();
        tokio::spawn(async move {
            let sink = orch.audio_sink.clone();
            let play_path = path.clone();
            let result = tokio::task::spawn_blocking(move || sink.play(&play_path, true, crate::audio::sink::SPEECH_RATE_SCALE)).await;
            if let Ok(Err(e)) = result {
                warn!("speech playback failed: {e}");
            }
            let resume = match &*orch.state.lock() {
                StateContext::Speaking { resume_to, .. } => *resume_to,
                _ => SpeakingResume::Idle,
            };
            match resume {
                SpeakingResume::Idle => orch.set_state(StateContext::Idle),
                SpeakingResume::News => orch.begin_news_cycle(),
            }
        });
    }

    fn begin_news_cycle(self: Arc<Self>) {
        self.set_state(StateContext::News(NewsProgress { headlines: Vec::new(), playing_index: 0, writing_slot: 0 }));
        let orch = self.clone();
        let task = TaskHandle::spawn(move |cancel| {
            tokio::spawn(async move {
                let dir = orch.config.temp_audio_dir();
                let synth = Synthesizer::new(&*orch.tts_client, "default", dir);
                let buffer = NewsBuffer::new(orch.config.temp_audio_dir());
                let streamer = NewsStreamer::new(&*orch.news_source, synth, orch.audio_sink.clone(), buffer, orch.ui.clone());
                let _ = streamer.run(&cancel).await;
                if !cancel.is_cancelled() {
                    orch.set_state(StateContext::Idle);
                }
            })
        });
        self.store_task(TaskKind::NewsPlay, task);
    }

    async fn handle_call_event(self: Arc<Self>, event: CallEvent) {
        match event {
            CallEvent::IncomingOffer { call_id, caller_name } => {
                info!("incoming call from {caller_name}");
                self.set_state(StateContext::Calling { call_id });
                self.audio_source.stop();
                for kind in [TaskKind::Wake, TaskKind::Think, TaskKind::Speak, TaskKind::Music, TaskKind::NewsTts, TaskKind::NewsPlay] {
                    self.cancel_task(kind);
                }
                // Music's own playback task isn't tracked in `tasks` (it
                // lives inside the Music Player) and must be stopped
                // directly so it can't keep holding the speaker while the
                // call's audio bridge needs it.
                self.music_player.stop().await;
                self.audio_sink.stop();
                let tasks = &self.tasks;
                crate::call::drain_for_call(|| tasks.lock().values().any(|t| !t.is_finished())).await;
                self.ui.on_event(UiEvent::ModeChanged { state: State::Calling });
            }
            CallEvent::HungUp { .. } => {
                tokio::time::sleep(crate::constants::CALL_HANGUP_DEVICE_RELEASE).await;
                if let Err(e) = self.audio_source.reinitialize() {
                    error!("failed to reinitialize audio source after call: {e}");
                }
                self.set_state(StateContext::Idle);
            }
            CallEvent::Failed { call_id, reason } => {
                warn!("call {call_id} failed: {reason}");
                self.set_state(StateContext::Idle);
            }
        }
    }
}
