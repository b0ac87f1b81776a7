//! Orchestrator state: the nine-value enumeration plus the tagged context
//! that carries only the data meaningful to the current state.
//!
//! Design Note 9 calls out the source's "mutable, heterogeneous current
//! state buffers" as the thing to re-architect away from. `StateContext`
//! is that re-architecture: each variant owns exactly the payload that
//! state needs, so there's no "is this field meaningful right now?"
//! ambiguity at the call site.

use crate::intent::Intent;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// The nine-value state enumeration. Only the Orchestrator may
/// write to it; everything else takes a snapshot under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Listening,
    Thinking,
    Acting,
    Chatting,
    Speaking,
    Music,
    News,
    Calling,
}

impl State {
    /// `Calling` has the highest preemption priority.
    pub fn preempts(self, other: State) -> bool {
        self == State::Calling && other != State::Calling
    }

    pub fn label(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Listening => "listening",
            State::Thinking => "thinking",
            State::Acting => "acting",
            State::Chatting => "chatting",
            State::Speaking => "speaking",
            State::Music => "music",
            State::News => "news",
            State::Calling => "calling",
        }
    }
}

/// Where `Speaking` should go once the audio finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingResume {
    Idle,
    News,
}

/// Where a headline within the News cycle currently stands.
#[derive(Debug, Clone)]
pub struct NewsProgress {
    pub headlines: Vec<String>,
    pub playing_index: usize,
    pub writing_slot: u8,
}

/// Tagged union carrying exactly the data relevant to the current `State`.
#[derive(Debug, Clone)]
pub enum StateContext {
    Idle,
    Listening { started_at: Instant },
    Thinking { transcript: String },
    Acting { intent: Intent },
    Chatting { intent: Intent },
    Speaking { audio_path: PathBuf, resume_to: SpeakingResume },
    Music { query: String },
    News(NewsProgress),
    Calling { call_id: Uuid },
}

impl StateContext {
    pub fn state(&self) -> State {
        match self {
            StateContext::Idle => State::Idle,
            StateContext::Listening { .. } => State::Listening,
            StateContext::Thinking { .. } => State::Thinking,
            StateContext::Acting { .. } => State::Acting,
            StateContext::Chatting { .. } => State::Chatting,
            StateContext::Speaking { .. } => State::Speaking,
            StateContext::Music { .. } => State::Music,
            StateContext::News(_) => State::News,
            StateContext::Calling { .. } => State::Calling,
        }
    }
}

/// An immutable snapshot of the Orchestrator's state, handed to readers
/// without holding the lock open: any task that inspects the state takes
/// a snapshot under lock rather than holding a reference into it.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: State,
    pub cycle_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calling_preempts_every_other_state() {
        for s in [
            State::Idle,
            State::Listening,
            State::Thinking,
            State::Acting,
            State::Chatting,
            State::Speaking,
            State::Music,
            State::News,
        ] {
            assert!(State::Calling.preempts(s));
        }
        assert!(!State::Calling.preempts(State::Calling));
    }

    #[test]
    fn context_state_round_trips() {
        let ctx = StateContext::Music { query: "happy".into() };
        assert_eq!(ctx.state(), State::Music);
    }
}
