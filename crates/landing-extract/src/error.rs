//! Error types for source-system extraction

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", describe_status(.status))]
    CommandFailed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Invalid extract window: last extract time {last} is not before current extract time {current}")]
    InvalidWindow { last: String, current: String },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("No tables found in {database} for schemas {schemas:?}")]
    NoTables {
        database: String,
        schemas: Vec<String>,
    },

    #[error("Compression error: {0}")]
    Compression(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl ExtractError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Reject names that cannot be embedded in a `db.schema.table` reference
///
/// Letters, digits, `_`, `$`, `#` and `@` are accepted; the first character
/// may not be a digit or `$`.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '#' || c == '@');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#' | '@'));

    if valid_start && valid_rest && name.len() <= 128 {
        Ok(name)
    } else {
        Err(ExtractError::InvalidIdentifier(name.to_string()))
    }
}
