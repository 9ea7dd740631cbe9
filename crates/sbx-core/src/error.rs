use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid job graph: {0}")]
    InvalidGraph(String),
}

pub type Result<T> = std::result::Result<T, Error>;
