//! Music Player — preset-based background music with progressive download.
//!
//! At most one playback task runs at a time. Starting a new preset while
//! one is in flight signals the old task to stop, waits up to
//! [`MUSIC_JOIN_TIMEOUT`] for it to exit, and abandons it as a detached
//! daemon if it doesn't — the new task starts regardless so a stuck
//! download can never block the user's next request.

use crate::audio::AudioSink;
use crate::constants::{DOWNLOAD_CHUNK_BYTES, MUSIC_JOIN_TIMEOUT, VOICE_PLAYBACK_RATE_SCALE};
use crate::error::{MirrorError, Result};
use crate::intent::actions::MusicTrigger;
use crate::ui::{UiEvent, UiSurface};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub const PRESETS: [&str; 3] = ["happy", "workout", "relaxing"];

/// Maps a preset keyword to its bundled bgm file name under
/// `resources/bgm/{Happy,Rocky,Merry-Go-Round of Life}.wav`.
fn preset_file_name(preset: &str) -> Option<&'static str> {
    match preset {
        "happy" => Some("Happy"),
        "workout" => Some("Rocky"),
        "relaxing" => Some("Merry-Go-Round of Life"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub download_url: String,
}

/// Music search collaborator contract: resolves a preset name to
/// a single track to stream.
#[async_trait]
pub trait MusicSearch: Send + Sync {
    async fn search(&self, preset: &str) -> Result<TrackInfo>;
}

#[async_trait]
impl MusicSearch for Box<dyn MusicSearch> {
    async fn search(&self, preset: &str) -> Result<TrackInfo> {
        (**self).search(preset).await
    }
}

struct RunningTask {
    stop_flag: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct MusicPlayer<S: MusicSearch> {
    search: S,
    sink: Arc<AudioSink>,
    http: reqwest::Client,
    temp_dir: PathBuf,
    bgm_dir: PathBuf,
    running: Mutex<Option<RunningTask>>,
    ui: Arc<dyn UiSurface>,
}

impl<S: MusicSearch + 'static> MusicPlayer<S> {
    pub fn new(search: S, sink: Arc<AudioSink>, temp_dir: impl Into<PathBuf>, bgm_dir: impl Into<PathBuf>, ui: Arc<dyn UiSurface>) -> Self {
        Self {
            search,
            sink,
            http: reqwest::Client::new(),
            temp_dir: temp_dir.into(),
            bgm_dir: bgm_dir.into(),
            running: Mutex::new(None),
            ui,
        }
    }

    /// Preempt any in-flight playback and start a fresh one for `query`.
    /// One of the three bundled presets plays straight from
    /// `resources/bgm/` with no network involved; anything else is
    /// resolved through the remote [`MusicSearch`] collaborator and
    /// streamed to a temp file as it downloads.
    pub async fn start_preset(&self, query: &str) -> Result<()> {
        self.stop_and_join().await;

        if let Some(file_name) = preset_file_name(query) {
            self.ui.on_event(UiEvent::MusicTitleUpdated { title: file_name.to_string(), artist: "Preset".into() });
            let path = self.bgm_dir.join(format!("{file_name}.wav"));
            let sink = self.sink.clone();
            let stop_flag = Arc::new(AtomicBool::new(false));
            let handle = tokio::spawn(async move {
                let play_sink = sink.clone();
                let result = tokio::task::spawn_blocking(move || play_sink.play(&path, true, VOICE_PLAYBACK_RATE_SCALE)).await;
                if let Ok(Err(e)) = result {
                    warn!("preset playback failed: {e}");
                }
            });
            *self.running.lock() = Some(RunningTask { stop_flag, handle });
            return Ok(());
        }

        let track = self.search.search(query).await?;
        self.ui.on_event(UiEvent::MusicTitleUpdated { title: track.title.clone(), artist: track.artist.clone() });
        let stop_flag = Arc::new(AtomicBool::new(false));
        let dest = self.temp_dir.join("music_download.wav");

        let sink = self.sink.clone();
        let http = self.http.clone();
        let task_stop = stop_flag.clone();
        let handle = tokio::spawn(async move {
            match download_with_stop(&http, &track.download_url, &dest, &task_stop).await {
                Ok(true) => {
                    let play_sink = sink.clone();
                    let play_dest = dest.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        play_sink.play(&play_dest, true, VOICE_PLAYBACK_RATE_SCALE)
                    })
                    .await;
                    if let Ok(Err(e)) = result {
                        warn!("music playback failed: {e}");
                    }
                }
                Ok(false) => {
                    let _ = std::fs::remove_file(&dest);
                }
                Err(e) => {
                    warn!("music download failed: {e}");
                    let _ = std::fs::remove_file(&dest);
                }
            }
        });

        *self.running.lock() = Some(RunningTask { stop_flag, handle });
        Ok(())
    }

    /// Stop whatever is currently playing/downloading, without starting
    /// anything new.
    pub async fn stop(&self) {
        self.stop_and_join().await;
    }

    async fn stop_and_join(&self) {
        let previous = self.running.lock().take();
        if let Some(task) = previous {
            task.stop_flag.store(true, Ordering::Release);
            self.sink.stop();
            match tokio::time::timeout(MUSIC_JOIN_TIMEOUT, task.handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("music task did not stop within {:?}; abandoning as daemon", MUSIC_JOIN_TIMEOUT);
                }
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.sink.is_playing()
    }
}

#[async_trait]
impl<S: MusicSearch + 'static> MusicTrigger for MusicPlayer<S> {
    async fn start_preset(&self, preset: &str) -> Result<()> {
        MusicPlayer::start_preset(self, preset).await
    }
}

/// Streams `url` to `dest` in [`DOWNLOAD_CHUNK_BYTES`] chunks, checking
/// `stop_flag` between chunks. Returns `Ok(true)` on full download,
/// `Ok(false)` if stopped early (caller is responsible for deleting the
/// partial file).
async fn download_with_stop(
    http: &reqwest::Client,
    url: &str,
    dest: &std::path::Path,
    stop_flag: &AtomicBool,
) -> Result<bool> {
    use futures_util::StreamExt;
    use std::io::Write;

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
    let mut stream = response.bytes_stream();
    let mut file = std::fs::File::create(dest).map_err(MirrorError::Io)?;
    let mut pending = Vec::with_capacity(DOWNLOAD_CHUNK_BYTES);

    while let Some(chunk) = stream.next().await {
        if stop_flag.load(Ordering::Acquire) {
            return Ok(false);
        }
        let chunk = chunk.map_err(|e| MirrorError::NetworkTransient(e.to_string()))?;
        pending.extend_from_slice(&chunk);
        while pending.len() >= DOWNLOAD_CHUNK_BYTES {
            let rest = pending.split_off(DOWNLOAD_CHUNK_BYTES);
            file.write_all(&pending).map_err(MirrorError::Io)?;
            pending = rest;
            if stop_flag.load(Ordering::Acquire) {
                return Ok(false);
            }
        }
    }
    if !pending.is_empty() {
        file.write_all(&pending).map_err(MirrorError::Io)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSearch;
    #[async_trait]
    impl MusicSearch for FixedSearch {
        async fn search(&self, preset: &str) -> Result<TrackInfo> {
            Ok(TrackInfo {
                title: format!("{preset} track"),
                artist: "Stub Artist".into(),
                download_url: "http://127.0.0.1:0/unreachable".into(),
            })
        }
    }

    #[test]
    fn presets_cover_happy_workout_relaxing() {
        assert_eq!(PRESETS, ["happy", "workout", "relaxing"]);
    }

    #[tokio::test]
    async fn preset_query_plays_bundled_file_without_touching_search() {
        let dir = tempfile::tempdir().unwrap();
        let player = MusicPlayer::new(FixedSearch, Arc::new(AudioSink::new()), dir.path(), dir.path(), Arc::new(crate::ui::NullUiSurface));
        // "happy" resolves to a bundled bgm file; playback will fail to
        // decode (no file on disk in this test) but start_preset itself
        // must still return Ok since the failure happens in the spawned
        // task, not synchronously.
        assert!(player.start_preset("happy").await.is_ok());
        player.stop().await;
    }

    #[tokio::test]
    async fn free_text_query_falls_back_to_remote_search() {
        let dir = tempfile::tempdir().unwrap();
        let player = MusicPlayer::new(FixedSearch, Arc::new(AudioSink::new()), dir.path(), dir.path(), Arc::new(crate::ui::NullUiSurface));
        // "some arbitrary song" isn't a preset, so this goes through
        // FixedSearch and then an (unreachable) download — still returns
        // Ok synchronously because the failure happens in the task.
        assert!(player.start_preset("some arbitrary song").await.is_ok());
        player.stop().await;
    }
}
