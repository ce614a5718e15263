use std::path::PathBuf;

use thiserror::Error;

use crate::transport::Channel;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to connect {channel} channel to {addr}: {source}")]
    Connection {
        channel: Channel,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out waiting for {0} response")]
    Timeout(Channel),
    #[error("malformed {channel} response: got {got} bytes, expected {expected}")]
    MalformedResponse {
        channel: Channel,
        got: usize,
        expected: usize,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid action index {index}, expected 0..{count}")]
    InvalidAction { index: usize, count: usize },
    #[error("step called outside a running episode, call reset first")]
    EpisodeNotRunning,
    #[error("failed to launch emulator `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load config {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Errors a live control loop should shrug off and treat as "no data this tick".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::MalformedResponse { .. }
        )
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
