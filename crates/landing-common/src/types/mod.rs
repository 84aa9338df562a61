//! Common types used across the landing workspace

use serde::{Deserialize, Serialize};

/// Final state of one upload call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferOutcome {
    /// Upload succeeded and remote content integrity was confirmed
    Verified,
    /// Upload completed, integrity was skipped, inconclusive or failed
    UploadedUnverified,
    /// The upload itself did not complete
    Failed,
}

impl TransferOutcome {
    /// Legacy numeric code: 0 verified, 1 uploaded, -1 failed
    pub fn code(self) -> i32 {
        match self {
            TransferOutcome::Verified => 0,
            TransferOutcome::UploadedUnverified => 1,
            TransferOutcome::Failed => -1,
        }
    }

    /// Whether the bytes reached the store
    pub fn is_uploaded(self) -> bool {
        !matches!(self, TransferOutcome::Failed)
    }
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOutcome::Verified => write!(f, "VERIFIED"),
            TransferOutcome::UploadedUnverified => write!(f, "UPLOADED_UNVERIFIED"),
            TransferOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Failure taxonomy attached to non-verified outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Network or service-side failure
    Transport,
    /// Local file missing, or remote object never became visible
    NotFound,
    /// Local file unreadable
    Io,
    /// Local and remote digests disagree
    IntegrityMismatch,
    Unknown,
}

impl ErrorKind {
    /// Transport faults may be retried; integrity faults must be escalated.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::NotFound)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "TRANSPORT"),
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::Io => write!(f, "IO"),
            ErrorKind::IntegrityMismatch => write!(f, "INTEGRITY_MISMATCH"),
            ErrorKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Kind plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
