//! Action Registry — ordered pattern-to-action bindings plus the built-in
//! predefined actions.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Result of executing a registered action.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    pub reply_text: Option<String>,
    pub data: HashMap<String, Value>,
    pub success: bool,
}

/// A predefined action bound to one or more matching patterns. Action
/// execution runs inline on the Orchestrator's current worker task unless
/// the action itself spawns further background work (the Music action
/// does).
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, params: &HashMap<String, Value>) -> crate::error::Result<ActionResult>;
}

pub struct RegisteredAction {
    pub name: String,
    pub patterns: Vec<Regex>,
    /// Canonical `reply_text` the Intent Router attaches to the `Intent`
    /// before execution — distinct from whatever the action
    /// itself later reports in its `ActionResult`.
    pub canonical_reply: String,
    pub extract: fn(&str) -> HashMap<String, Value>,
    pub action: Box<dyn Action>,
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: Vec<RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self { actions: Vec::new() }
    }

    /// Register order determines match precedence: patterns are tried in
    /// registration order across all actions, first match wins.
    pub fn register(&mut self, action: RegisteredAction) {
        self.actions.push(action);
    }

    pub fn match_text(&self, normalized: &str) -> Option<(&RegisteredAction, HashMap<String, Value>)> {
        for action in &self.actions {
            for pattern in &action.patterns {
                if pattern.is_match(normalized) {
                    return Some((action, (action.extract)(normalized)));
                }
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Weather collaborator contract.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    async fn current(&self, location: &str) -> crate::error::Result<WeatherReport>;
}

#[async_trait]
impl WeatherClient for Box<dyn WeatherClient> {
    async fn current(&self, location: &str) -> crate::error::Result<WeatherReport> {
        (**self).current(location).await
    }
}

#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub location: String,
    pub temperature_f: f32,
    pub condition: String,
}

pub struct WeatherAction<C: WeatherClient> {
    client: C,
    default_location: String,
}

impl<C: WeatherClient> WeatherAction<C> {
    pub fn new(client: C, default_location: impl Into<String>) -> Self {
        Self { client, default_location: default_location.into() }
    }
}

#[async_trait]
impl<C: WeatherClient> Action for WeatherAction<C> {
    async fn execute(&self, params: &HashMap<String, Value>) -> crate::error::Result<ActionResult> {
        let location = params
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_location);
        let report = self.client.current(location).await?;
        let reply = format!(
            "It's {:.0} degrees and {} in {}.",
            report.temperature_f, report.condition, report.location
        );
        let mut data = HashMap::new();
        data.insert("temperature_f".into(), serde_json::json!(report.temperature_f));
        data.insert("condition".into(), serde_json::json!(report.condition));
        Ok(ActionResult { reply_text: Some(reply), data, success: true })
    }
}

static LOCATION_RE: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"(?:in|for)\s+([a-zA-Z\s]+)$").unwrap());

/// Extracts a trailing "in <place>" / "for <place>" location phrase, if any.
pub fn extract_weather_location(text: &str) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    if let Some(caps) = LOCATION_RE.captures(text) {
        if let Some(m) = caps.get(1) {
            params.insert("location".into(), serde_json::json!(m.as_str().trim()));
        }
    }
    params
}

/// News Streamer collaborator hook — the News action only kicks off the
/// streamer; the streamer itself owns fetch/synthesis/playback.
#[async_trait]
pub trait NewsTrigger: Send + Sync {
    async fn start_cycle(&self) -> crate::error::Result<()>;
}

#[async_trait]
impl NewsTrigger for Box<dyn NewsTrigger> {
    async fn start_cycle(&self) -> crate::error::Result<()> {
        (**self).start_cycle().await
    }
}

pub struct NewsAction<T: NewsTrigger> {
    trigger: T,
}

impl<T: NewsTrigger> NewsAction<T> {
    pub fn new(trigger: T) -> Self {
        Self { trigger }
    }
}

#[async_trait]
impl<T: NewsTrigger> Action for NewsAction<T> {
    async fn execute(&self, _params: &HashMap<String, Value>) -> crate::error::Result<ActionResult> {
        self.trigger.start_cycle().await?;
        Ok(ActionResult { reply_text: None, data: HashMap::new(), success: true })
    }
}

/// Music Player collaborator hook — the Music action only kicks off
/// playback; the player itself owns the poll/download/stop lifecycle.
#[async_trait]
pub trait MusicTrigger: Send + Sync {
    async fn start_preset(&self, preset: &str) -> crate::error::Result<()>;
}

#[async_trait]
impl MusicTrigger for Box<dyn MusicTrigger> {
    async fn start_preset(&self, preset: &str) -> crate::error::Result<()> {
        (**self).start_preset(preset).await
    }
}

pub struct MusicAction<T: MusicTrigger> {
    trigger: T,
}

impl<T: MusicTrigger> MusicAction<T> {
    pub fn new(trigger: T) -> Self {
        Self { trigger }
    }
}

#[async_trait]
impl<T: MusicTrigger> Action for MusicAction<T> {
    async fn execute(&self, params: &HashMap<String, Value>) -> crate::error::Result<ActionResult> {
        let preset = params.get("preset").and_then(Value::as_str).unwrap_or("happy");
        self.trigger.start_preset(preset).await?;
        Ok(ActionResult { reply_text: None, data: HashMap::new(), success: true })
    }
}

/// Maps "happy"/"workout"/"relaxing" keywords (and a couple of synonyms) to
/// a canonical preset name; defaults to "happy" when nothing matches.
pub fn extract_music_preset(text: &str) -> HashMap<String, Value> {
    let preset = if text.contains("workout") || text.contains("gym") || text.contains("energetic") {
        "workout"
    } else if text.contains("relax") || text.contains("calm") || text.contains("chill") {
        "relaxing"
    } else {
        "happy"
    };
    let mut params = HashMap::new();
    params.insert("preset".into(), serde_json::json!(preset));
    params
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// No-op stand-in used by intent router tests that only exercise
    /// pattern matching, not action execution.
    pub struct StubAction;

    #[async_trait]
    impl Action for StubAction {
        async fn execute(&self, _params: &HashMap<String, Value>) -> crate::error::Result<ActionResult> {
            Ok(ActionResult::default())
        }
    }

    struct FixedWeather;
    #[async_trait]
    impl WeatherClient for FixedWeather {
        async fn current(&self, location: &str) -> crate::error::Result<WeatherReport> {
            Ok(WeatherReport { location: location.to_string(), temperature_f: 72.0, condition: "clear".into() })
        }
    }

    #[tokio::test]
    async fn weather_action_uses_extracted_location() {
        let action = WeatherAction::new(FixedWeather, "Seattle");
        let mut params = HashMap::new();
        params.insert("location".into(), serde_json::json!("Austin"));
        let result = action.execute(&params).await.unwrap();
        assert!(result.reply_text.unwrap().contains("Austin"));
    }

    #[tokio::test]
    async fn weather_action_falls_back_to_default_location() {
        let action = WeatherAction::new(FixedWeather, "Seattle");
        let result = action.execute(&HashMap::new()).await.unwrap();
        assert!(result.reply_text.unwrap().contains("Seattle"));
    }

    #[test]
    fn registry_matches_in_registration_order() {
        let mut registry = ActionRegistry::new();
        registry.register(RegisteredAction {
            name: "news".into(),
            patterns: vec![Regex::new(r"news").unwrap()],
            canonical_reply: "Here's the news.".into(),
            extract: |_| HashMap::new(),
            action: Box::new(StubAction),
        });
        registry.register(RegisteredAction {
            name: "weather".into(),
            patterns: vec![Regex::new(r"weather").unwrap()],
            canonical_reply: "Let me check the weather.".into(),
            extract: extract_weather_location,
            action: Box::new(StubAction),
        });
        let (matched, _) = registry.match_text("what's the weather like today").unwrap();
        assert_eq!(matched.name, "weather");
        assert!(registry.match_text("tell me a joke").is_none());
    }

    #[test]
    fn music_preset_defaults_to_happy() {
        let params = extract_music_preset("play some music");
        assert_eq!(params.get("preset").unwrap(), "happy");
    }

    #[test]
    fn music_preset_detects_workout_keyword() {
        let params = extract_music_preset("play workout music");
        assert_eq!(params.get("preset").unwrap(), "workout");
    }
}
