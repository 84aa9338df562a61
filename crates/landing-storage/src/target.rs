//! Upload destinations and per-call reports

use landing_common::{ErrorDetail, ErrorKind, LandingError, Result, TransferOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where one local file goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
    pub path: PathBuf,
}

impl UploadTarget {
    /// Build a target, deriving the key from the file name when none is given
    pub fn new(bucket: impl Into<String>, path: impl AsRef<Path>, key: Option<&str>) -> Result<Self> {
        let bucket = bucket.into();
        let path = path.as_ref().to_path_buf();

        if bucket.trim().is_empty() {
            return Err(LandingError::InvalidTarget("bucket must not be empty".to_string()));
        }

        let key = match key.map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    LandingError::InvalidTarget(format!(
                        "cannot derive an object key from {}",
                        path.display()
                    ))
                })?,
        };

        Ok(Self { bucket, key, path })
    }

    /// `s3://bucket/key`
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl std::fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// Phase of one landing, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingState {
    Start,
    Digesting,
    Uploading,
    Verifying,
    Verified,
    UploadedUnverified,
    Failed,
}

impl LandingState {
    pub fn terminal(outcome: TransferOutcome) -> Self {
        match outcome {
            TransferOutcome::Verified => LandingState::Verified,
            TransferOutcome::UploadedUnverified => LandingState::UploadedUnverified,
            TransferOutcome::Failed => LandingState::Failed,
        }
    }
}

impl std::fmt::Display for LandingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LandingState::Start => "START",
            LandingState::Digesting => "DIGESTING",
            LandingState::Uploading => "UPLOADING",
            LandingState::Verifying => "VERIFYING",
            LandingState::Verified => "VERIFIED",
            LandingState::UploadedUnverified => "UPLOADED_UNVERIFIED",
            LandingState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Result of one upload session call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub outcome: TransferOutcome,
    /// `None` exactly when the outcome is `Verified`
    pub detail: Option<ErrorDetail>,
    /// ETag returned by the store, quoting stripped
    pub etag: Option<String>,
    /// 0 for a single PUT
    pub parts: usize,
}

impl UploadReport {
    pub fn verified(etag: impl Into<String>, parts: usize) -> Self {
        Self {
            outcome: TransferOutcome::Verified,
            detail: None,
            etag: Some(etag.into()),
            parts,
        }
    }

    pub fn unverified(detail: ErrorDetail, etag: Option<String>, parts: usize) -> Self {
        Self {
            outcome: TransferOutcome::UploadedUnverified,
            detail: Some(detail),
            etag,
            parts,
        }
    }

    /// Uploaded without any integrity comparison
    pub fn skipped(etag: Option<String>, parts: usize) -> Self {
        Self::unverified(
            ErrorDetail::new(ErrorKind::Unknown, "integrity verification skipped"),
            etag,
            parts,
        )
    }

    pub fn failed(err: &LandingError) -> Self {
        Self {
            outcome: TransferOutcome::Failed,
            detail: Some(err.to_detail()),
            etag: None,
            parts: 0,
        }
    }
}

/// Result of landing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingReport {
    pub path: PathBuf,
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub outcome: TransferOutcome,
    pub detail: Option<ErrorDetail>,
    pub etag: Option<String>,
    pub parts: usize,
}

impl LandingReport {
    pub(crate) fn from_upload(target: &UploadTarget, size: u64, report: UploadReport) -> Self {
        Self {
            path: target.path.clone(),
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            size,
            outcome: report.outcome,
            detail: report.detail,
            etag: report.etag,
            parts: report.parts,
        }
    }

    /// Failure before any network call; the key may not be known yet
    pub(crate) fn rejected(path: &Path, bucket: &str, key: Option<&str>, err: &LandingError) -> Self {
        Self {
            path: path.to_path_buf(),
            bucket: bucket.to_string(),
            key: key.unwrap_or_default().to_string(),
            size: 0,
            outcome: TransferOutcome::Failed,
            detail: Some(err.to_detail()),
            etag: None,
            parts: 0,
        }
    }

    /// Process exit status: 0 verified, 1 unverified, 2 failed
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            TransferOutcome::Verified => 0,
            TransferOutcome::UploadedUnverified => 1,
            TransferOutcome::Failed => 2,
        }
    }
}
