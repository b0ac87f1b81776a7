//! UI Surface — render-callback collaborator contract.
//!
//! The screen-rendering loop itself is out of scope; this module
//! only defines the events the Orchestrator's tick loop emits and a no-op
//! implementation for headless operation.

use crate::state::State;

#[derive(Debug, Clone)]
pub enum UiEvent {
    ModeChanged { state: State },
    NewsTitleUpdated { title: String },
    WeatherUpdated { temperature_f: f32, condition: String, location: String },
    MusicTitleUpdated { title: String, artist: String },
}

/// UI Surface collaborator contract: a render-callback sink that receives
/// mode-change and data-update events. Never fails — a broken
/// renderer must not be able to disrupt the state machine.
pub trait UiSurface: Send + Sync {
    fn on_event(&self, event: UiEvent);
}

/// Used when no real renderer is wired up (tests, headless runs).
#[derive(Default)]
pub struct NullUiSurface;

impl UiSurface for NullUiSurface {
    fn on_event(&self, _event: UiEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_surface_accepts_every_event_without_panicking() {
        let ui = NullUiSurface;
        ui.on_event(UiEvent::ModeChanged { state: State::Idle });
        ui.on_event(UiEvent::NewsTitleUpdated { title: "x".into() });
        ui.on_event(UiEvent::WeatherUpdated { temperature_f: 70.0, condition: "clear".into(), location: "Seattle".into() });
        ui.on_event(UiEvent::MusicTitleUpdated { title: "Song".into(), artist: "Artist".into() });
    }
}
