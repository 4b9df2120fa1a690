//! Error types for deepdive-core

use thiserror::Error;

/// Main error type for the deepdive-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Primary store error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed collection or page URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A storage tier refused a read or write
    #[error("storage error: {0}")]
    Storage(String),

    /// A queued or direct call carried arguments of the wrong shape
    #[error("invalid arguments for {method}: {message}")]
    InvalidArguments { method: String, message: String },

    /// The transport could not issue a collection request
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for deepdive-core
pub type Result<T> = std::result::Result<T, Error>;
