use thiserror::Error;

/// Errors raised while building, signing, verifying or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("unexpected event kind {actual}, expected {expected}")]
    UnexpectedKind { expected: u16, actual: u16 },

    #[error("malformed content for kind {kind}: {reason}")]
    MalformedContent { kind: u16, reason: String },

    #[error("invalid cost '{input}': {reason}")]
    InvalidCost { input: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
