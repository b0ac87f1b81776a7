//! Crate-wide error taxonomy.
//!
//! Every fallible boundary in the orchestrator returns `MirrorError`. The
//! variants mirror the failure taxonomy: device-unavailable is fatal at
//! startup and recoverable at runtime; network-transient never crashes the
//! pipeline; decode-failure and logic-invariant-broken are logged and
//! skipped over.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("network request failed: {0}")]
    NetworkTransient(String),

    #[error("failed to decode audio: {0}")]
    DecodeFailure(String),

    #[error("logic invariant broken: {0}")]
    LogicInvariantBroken(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
