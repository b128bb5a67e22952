use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("request {0} is already pending")]
    DuplicateRequest(String),

    #[error("no pending request with id {0}")]
    UnknownRequest(String),
}
