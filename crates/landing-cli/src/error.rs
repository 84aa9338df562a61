//! Error types for the landing CLI
//!
//! Messages are user-facing and end with a hint on how to fix the problem.

use landing_common::LandingError;
use landing_extract::ExtractError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Storage or digest operation failed
    #[error(transparent)]
    Landing(#[from] LandingError),

    /// Extraction failed before any table was dumped
    #[error("Extraction failed: {0}. Check that bcp and sqlcmd are installed and the source server is reachable.")]
    Extract(#[from] ExtractError),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the path exists and you have read permissions.")]
    FileNotFound(String),

    /// Flags that parse individually but do not fit together
    #[error("Invalid arguments: {0}. Run with --help to see usage.")]
    Usage(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Report rendering failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
