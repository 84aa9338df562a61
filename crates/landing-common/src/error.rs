//! Error types for the landing pipeline

use crate::types::{ErrorDetail, ErrorKind};
use thiserror::Error;

/// Result type alias for landing operations
pub type Result<T> = std::result::Result<T, LandingError>;

/// Main error type for the landing pipeline
#[derive(Error, Debug)]
pub enum LandingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Integrity mismatch for {key}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid upload target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LandingError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a remote not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an integrity mismatch error
    pub fn integrity_mismatch(
        key: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            key: key.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify an I/O error on a local path, keeping "missing" distinct
    pub fn local_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path.display().to_string())
        } else {
            Self::Io(err)
        }
    }

    /// Position of this error in the outcome taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LandingError::Io(_) => ErrorKind::Io,
            LandingError::FileNotFound(_) | LandingError::NotFound(_) => ErrorKind::NotFound,
            // Cancellation leaves the remote object in an unknown state.
            LandingError::Transport(_) | LandingError::Cancelled(_) => ErrorKind::Transport,
            LandingError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            LandingError::InvalidTarget(_)
            | LandingError::Config(_)
            | LandingError::Serialization(_)
            | LandingError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Structured detail suitable for a transfer report
    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail::new(self.kind(), self.to_string())
    }
}

impl From<LandingError> for ErrorDetail {
    fn from(err: LandingError) -> Self {
        err.to_detail()
    }
}
