//! Error types for the wildcard-worker library.

use thiserror::Error;

/// Errors that can occur while handling worker events.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error from the network seam.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A fetched resource answered with a non-success status.
    #[error("Bad response status {status} for {url}")]
    Status {
        /// URL that was requested.
        url: String,
        /// HTTP status code received.
        status: u16,
    },

    /// A request could not be sent as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// I/O error in the disk cache or config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be parsed or serialized as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache storage failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// The host refused to display a notification or open a window.
    #[error("Host error: {0}")]
    Host(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// A specialized `Result` type for wildcard-worker operations.
pub type Result<T> = std::result::Result<T, Error>;
