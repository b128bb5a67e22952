use arn_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by relay transports and the relay pool.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("relay {url} unreachable: {reason}")]
    RelayUnreachable { url: String, reason: String },

    #[error("all {attempted} relays failed to accept the event")]
    AllRelaysUnreachable { attempted: usize },

    #[error("not connected to relay {0}")]
    NotConnected(String),

    #[error("relay {url} rejected event: {reason}")]
    Rejected { url: String, reason: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed relay frame: {0}")]
    Frame(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NetworkError {
    pub fn unreachable(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::RelayUnreachable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
