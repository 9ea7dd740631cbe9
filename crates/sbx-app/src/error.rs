use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("backend unreachable: {0}")]
    Connection(String),

    #[error("workflow validation failed: {0}")]
    Validation(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("no image after {0:?}")]
    Timeout(Duration),

    /// The backend has not finished writing the file yet.
    #[error("artifact '{0}' not available yet")]
    NotFound(String),

    #[error("unexpected response from backend: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Request(#[from] sbx_core::Error),

    #[error("failed to store artifact: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerateError {
    /// Transport-level failure of a single HTTP call.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::UnexpectedResponse(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
