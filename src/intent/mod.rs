//! Intent Router — classifies user text into a predefined action or a
//! free-form chat turn.

pub mod actions;

use crate::constants::CHAT_REPLY_MAX_WORDS;
use actions::ActionRegistry;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum IntentKind {
    Predefined,
    Chat,
}

/// The Intent Router's classification result: which kind of turn this
/// was, which action (if any) it resolved to, and the reply text to speak.
#[derive(Debug, Clone)]
pub struct Intent {
    pub kind: IntentKind,
    pub action_name: Option<String>,
    pub action_params: HashMap<String, Value>,
    pub reply_text: String,
    pub confidence: f32,
}

impl Intent {
    pub fn predefined(action_name: impl Into<String>, action_params: HashMap<String, Value>, reply_text: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Predefined,
            action_name: Some(action_name.into()),
            action_params,
            reply_text: reply_text.into(),
            confidence: 0.9,
        }
    }

    pub fn chat(reply_text: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Chat,
            action_name: None,
            action_params: HashMap::new(),
            reply_text: reply_text.into(),
            confidence: 0.5,
        }
    }
}

/// Fixed fallback used when the chat client fails.
pub const CHAT_FALLBACK_REPLY: &str = "Sorry, I don't understand your meaning.";

/// Fixed in-character system prompt handed to the chat LLM.
pub const MIRROR_SYSTEM_PROMPT: &str =
    "You are the Magic Mirror, a warm and witty smart-mirror assistant. \
     Reply in character, keep answers under 30 words.";

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub tokens_used: u32,
    pub model: String,
}

/// Chat LLM collaborator contract.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn ask(&self, prompt: &str, system_prompt: &str) -> crate::error::Result<ChatReply>;
}

#[async_trait]
impl ChatClient for Box<dyn ChatClient> {
    async fn ask(&self, prompt: &str, system_prompt: &str) -> crate::error::Result<ChatReply> {
        (**self).ask(prompt, system_prompt).await
    }
}

pub struct IntentRouter<'a, C: ChatClient> {
    registry: &'a ActionRegistry,
    chat_client: &'a C,
}

impl<'a, C: ChatClient> IntentRouter<'a, C> {
    pub fn new(registry: &'a ActionRegistry, chat_client: &'a C) -> Self {
        Self { registry, chat_client }
    }

    /// Classify `text` using the four-step algorithm below.
    pub async fn route(&self, text: &str) -> Intent {
        let normalized = text.trim().to_lowercase();

        if let Some((action, params)) = self.registry.match_text(&normalized) {
            return Intent::predefined(action.name.clone(), params, action.canonical_reply.clone());
        }

        match self.chat_client.ask(text, MIRROR_SYSTEM_PROMPT).await {
            Ok(reply) => Intent::chat(cap_words(&reply.text, CHAT_REPLY_MAX_WORDS)),
            Err(_) => Intent::chat(CHAT_FALLBACK_REPLY),
        }
    }
}

fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().take(max_words).collect();
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actions::{tests::StubAction, RegisteredAction};
    use regex::Regex;

    struct FailingChat;
    #[async_trait]
    impl ChatClient for FailingChat {
        async fn ask(&self, _prompt: &str, _system_prompt: &str) -> crate::error::Result<ChatReply> {
            Err(crate::error::MirrorError::NetworkTransient("HTTP 500".into()))
        }
    }

    struct OkChat;
    #[async_trait]
    impl ChatClient for OkChat {
        async fn ask(&self, _prompt: &str, _system_prompt: &str) -> crate::error::Result<ChatReply> {
            Ok(ChatReply { text: "I am the mirror on the wall.".into(), tokens_used: 10, model: "stub".into() })
        }
    }

    fn registry_with_news() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(RegisteredAction {
            name: "news".into(),
            patterns: vec![Regex::new(r"news").unwrap()],
            canonical_reply: "Here's the news.".into(),
            extract: |_| HashMap::new(),
            action: Box::new(StubAction),
        });
        registry
    }

    #[tokio::test]
    async fn routes_matching_text_to_predefined_action() {
        let registry = registry_with_news();
        let chat = OkChat;
        let router = IntentRouter::new(&registry, &chat);
        let intent = router.route("show me the news").await;
        assert_eq!(intent.kind, IntentKind::Predefined);
        assert_eq!(intent.action_name.as_deref(), Some("news"));
    }

    #[tokio::test]
    async fn unmatched_text_falls_back_to_chat() {
        let registry = registry_with_news();
        let chat = OkChat;
        let router = IntentRouter::new(&registry, &chat);
        let intent = router.route("what is AI").await;
        assert_eq!(intent.kind, IntentKind::Chat);
    }

    #[tokio::test]
    async fn chat_failure_substitutes_fixed_fallback() {
        let registry = registry_with_news();
        let chat = FailingChat;
        let router = IntentRouter::new(&registry, &chat);
        let intent = router.route("what is AI").await;
        assert_eq!(intent.reply_text, CHAT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn wake_word_inside_transcript_still_routes_via_router() {
        let registry = registry_with_news();
        let chat = OkChat;
        let router = IntentRouter::new(&registry, &chat);
        // Contains the wake word "hello" but arrives as a transcript — must
        // still route through the Intent Router rather than re-triggering
        // wake detection.
        let intent = router.route("hello there").await;
        assert_eq!(intent.kind, IntentKind::Chat);
    }
}
