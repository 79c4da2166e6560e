//! Error types for the meshgym environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to an external agent.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Socket or channel level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The agent went away while the simulation was waiting on it
    #[error("Agent disconnected")]
    Disconnected,

    /// No reply within the configured bound
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Message encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The agent replied with a message that is not valid at this point
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport compiled out of this build
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
