use arn_network::NetworkError;
use arn_protocol::ProtocolError;
use arn_state::StateError;
use thiserror::Error;

/// Errors returned by [`AgentNetwork`](crate::AgentNetwork) operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("relay {url} unreachable: {reason}")]
    RelayUnreachable { url: String, reason: String },

    #[error("all {attempted} relays failed to accept the event")]
    AllRelaysUnreachable { attempted: usize },

    #[error("no pending request with id {0}")]
    UnknownRequest(String),

    #[error("network is not running")]
    NetworkNotRunning,

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<NetworkError> for NodeError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::RelayUnreachable { url, reason } => Self::RelayUnreachable { url, reason },
            NetworkError::AllRelaysUnreachable { attempted } => Self::AllRelaysUnreachable { attempted },
            NetworkError::NotConnected(url) => Self::RelayUnreachable {
                url,
                reason: "not connected".into(),
            },
            NetworkError::Rejected { url, reason } => Self::RelayUnreachable {
                url,
                reason: format!("rejected: {reason}"),
            },
            NetworkError::Protocol(e) => Self::Protocol(e),
            NetworkError::Serialization(e) => Self::Protocol(ProtocolError::Serialization(e)),
            other @ (NetworkError::Timeout(_) | NetworkError::Transport(_) | NetworkError::Frame(_)) => {
                Self::RelayUnreachable {
                    url: String::new(),
                    reason: other.to_string(),
                }
            }
        }
    }
}

impl From<StateError> for NodeError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::DuplicateRequest(id) => {
                Self::InvalidRequest(format!("request {id} is already pending"))
            }
            StateError::UnknownRequest(id) => Self::UnknownRequest(id),
        }
    }
}
