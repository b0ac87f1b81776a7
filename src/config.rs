//! Environment-driven configuration, loaded once at startup.
//!
//! The binary reads a music API key, ASR credential/model paths, and a
//! chat LLM key + URL from the environment. A missing
//! *required* path is a fatal, logged error before any device is opened —
//! configuration failures belong to the same "fatal at startup" class as
//! device-unavailable.

use crate::error::{MirrorError, Result};
use std::path::PathBuf;

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the install, used to resolve `resources/` and `temp/`.
    pub install_root: PathBuf,
    /// Wake phrase, default `"hello"`.
    pub wake_phrase: String,
    /// Credentials file for the remote streaming ASR vendor.
    pub asr_credentials_path: Option<PathBuf>,
    /// Path to the local wake-word keyword model.
    pub wake_model_path: Option<PathBuf>,
    /// Chat LLM API key and base URL.
    pub chat_api_key: Option<String>,
    pub chat_api_url: Option<String>,
    /// Music search API key.
    pub music_api_key: Option<String>,
    /// Optional TLS material for the call-signaling server.
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Only `install_root` resolution can fail fatally here; every
    /// credential/key is optional at the config layer so collaborator
    /// adapters can surface their own "network-transient" failure instead
    /// (e.g. a missing chat key routes to the chat-failure fallback reply,
    /// not a crash).
    pub fn from_env() -> Result<Self> {
        let install_root = match std::env::var_os("MIRROR_INSTALL_ROOT") {
            Some(v) => PathBuf::from(v),
            None => std::env::current_dir().map_err(MirrorError::Io)?,
        };

        Ok(Self {
            install_root,
            wake_phrase: std::env::var("MIRROR_WAKE_PHRASE").unwrap_or_else(|_| "hello".into()),
            asr_credentials_path: std::env::var_os("MIRROR_ASR_CREDENTIALS").map(PathBuf::from),
            wake_model_path: std::env::var_os("MIRROR_WAKE_MODEL_PATH").map(PathBuf::from),
            chat_api_key: std::env::var("MIRROR_CHAT_API_KEY").ok(),
            chat_api_url: std::env::var("MIRROR_CHAT_API_URL").ok(),
            music_api_key: std::env::var("MIRROR_MUSIC_API_KEY").ok(),
            tls_cert_path: std::env::var_os("MIRROR_TLS_CERT").map(PathBuf::from),
            tls_key_path: std::env::var_os("MIRROR_TLS_KEY").map(PathBuf::from),
        })
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.install_root.join("resources")
    }

    pub fn temp_audio_dir(&self) -> PathBuf {
        self.install_root.join("temp").join("audio")
    }

    pub fn news_tts_slot_path(&self, slot: u8) -> PathBuf {
        self.temp_audio_dir().join(format!("news_tts_{slot}.wav"))
    }

    pub fn bgm_path(&self, name: &str) -> PathBuf {
        self.resources_dir().join("bgm").join(format!("{name}.wav"))
    }

    pub fn news_headlines_intro_path(&self) -> PathBuf {
        self.resources_dir().join("news_headlines.wav")
    }

    pub fn mission_accomplished_path(&self) -> PathBuf {
        self.resources_dir().join("mission_accomplished.wav")
    }

    /// Single-line file holding the most recent final transcript, used
    /// for debugging and cross-process reads.
    pub fn last_transcript_path(&self) -> PathBuf {
        self.temp_audio_dir().join("last_transcript.txt")
    }
}
