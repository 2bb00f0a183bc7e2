//! Error taxonomy shared by every search-core operation.

use crate::DocId;
use thiserror::Error;

/// Result type alias for search-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad caller input: a term that does not reduce to exactly one token,
    /// empty text, out-of-range tuning parameters, or an index that is not ready.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown document id
    #[error("document {0} not found")]
    NotFound(DocId),

    /// A persisted cache artifact is absent, unreadable or stale
    #[error("cache missing: {0}")]
    CacheMissing(String),

    /// A vector's length disagrees with the stored chunk vectors
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The encoder failed to produce vectors
    #[error("encoder error: {0}")]
    Encoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
