//! Error types for the bloodbank_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bloodbank_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// CSV write or transport error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed quantity, date, enum value or persisted row
    #[error("Validation error: {0}")]
    Validation(String),

    /// No matching record, request, test or profile
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insufficient units, blocked stock, already completed, ...
    #[error("Precondition failed: {0}")]
    Precondition(String),
}

impl Error {
    /// True when the failure came from durable storage.
    ///
    /// The operation must be treated as not applied; reload state before retrying.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Csv(_))
    }
}
