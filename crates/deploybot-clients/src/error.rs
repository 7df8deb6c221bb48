use deploybot_core::collab::CollaboratorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to decode {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("client configuration error: {0}")]
    Config(String),
}

impl From<ClientError> for CollaboratorError {
    fn from(err: ClientError) -> Self {
        CollaboratorError::new(err.to_string())
    }
}
