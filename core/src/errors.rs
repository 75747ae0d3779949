use thiserror::Error;

/// Errors related to communication with a backing store.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),

    #[error("provider used before its fields were initialized")]
    NotBound,
}
