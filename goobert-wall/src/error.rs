//! Error types for goobert-wall
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the wall orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Statistics database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Media engine creation or command errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Scan produced no playable files
    #[error("No media found: {0}")]
    NoMedia(String),

    /// Operation not valid in the current wall state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cell, file or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<goobert_common::Error> for Error {
    fn from(err: goobert_common::Error) -> Self {
        use goobert_common::Error as Common;
        match err {
            Common::Database(e) => Error::Database(e),
            Common::Io(e) => Error::Io(e),
            Common::Config(msg) => Error::Config(msg),
            Common::NotFound(msg) => Error::NotFound(msg),
            Common::InvalidInput(msg) => Error::InvalidState(msg),
            Common::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using goobert-wall Error
pub type Result<T> = std::result::Result<T, Error>;
