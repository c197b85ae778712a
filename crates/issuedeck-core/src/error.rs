//! Error types for issuedeck.
//!
//! Every failure in the request pipeline is a value of [`IssuedeckError`].
//! Nothing panics across an asynchronous boundary; continuations receive
//! these errors in their `Err` slot.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the issuedeck library.
#[derive(Debug, Error)]
pub enum IssuedeckError {
    // Transport errors
    #[error("Failed to start {program}: {message}")]
    Spawn {
        program: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Request failed ({}): {stderr}", exit_status(.exit_code))]
    Transport {
        exit_code: Option<i32>,
        /// Captured diagnostic stream of the external process.
        stderr: String,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    // Payload errors
    #[error("Failed to decode response: {reason}. Raw response: {raw}")]
    Decode { reason: String, raw: String },

    #[error("Remote error: {message}")]
    Protocol { message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for issuedeck operations.
pub type Result<T> = std::result::Result<T, IssuedeckError>;

impl From<std::io::Error> for IssuedeckError {
    fn from(err: std::io::Error) -> Self {
        IssuedeckError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for IssuedeckError {
    fn from(err: serde_json::Error) -> Self {
        IssuedeckError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl IssuedeckError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        IssuedeckError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        IssuedeckError::Config {
            message: message.into(),
        }
    }

    /// Check whether a caller could reasonably retry the operation.
    ///
    /// The pipeline itself never retries; this only classifies the failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IssuedeckError::Transport { .. } | IssuedeckError::Timeout(_)
        )
    }
}

/// Exit status wording for transport errors.
fn exit_status(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}
