//! Landing orchestrator
//!
//! Entry point for callers: one call per local file, one report per call.
//!
//! ```text
//! START -> DIGESTING -> UPLOADING -> VERIFYING -> VERIFIED
//!                           |             \-----> UPLOADED_UNVERIFIED
//!                           \-------------------> FAILED
//! ```
//!
//! `FAILED` is only reached before or during the write; once the bytes are
//! stored the worst outcome is `UPLOADED_UNVERIFIED`.

use crate::config::{LandingOptions, StorageConfig};
use crate::s3::S3ObjectStore;
use crate::session::UploadSession;
use crate::store::ObjectStore;
use crate::target::{LandingReport, LandingState, UploadTarget};
use futures::stream::{self, StreamExt};
use landing_common::{LandingError, Result, TransferOutcome};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub struct Landing<S: ObjectStore> {
    session: UploadSession<S>,
}

impl<S: ObjectStore> Clone for Landing<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl Landing<S3ObjectStore> {
    /// Connect to S3 (or an S3-compatible endpoint)
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let store = S3ObjectStore::new(config).await?;
        Ok(Self::new(UploadSession::new(store)))
    }
}

impl<S: ObjectStore + 'static> Landing<S> {
    pub fn new(session: UploadSession<S>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &UploadSession<S> {
        &self.session
    }

    pub fn close(self) {
        self.session.close();
    }

    /// Upload one file and report how far its integrity was established
    ///
    /// Files below `options.transfer.multipart_threshold` go up in one PUT,
    /// the rest in parts. A missing key is derived from the file name.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), bucket = %bucket))]
    pub async fn land(
        &self,
        path: impl AsRef<Path>,
        bucket: &str,
        key: Option<&str>,
        options: &LandingOptions,
    ) -> LandingReport {
        let path = path.as_ref();
        debug!(state = %LandingState::Start, key = ?key);

        let (target, size) = match Self::prepare(path, bucket, key, options).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Landing rejected before upload");
                debug!(state = %LandingState::Failed);
                return LandingReport::rejected(path, bucket, key, &e);
            },
        };

        let session = self.session.clone().with_poll(options.poll);
        let report = if size < options.transfer.multipart_threshold {
            session.upload_single(&target, options.verify_integrity).await
        } else {
            session
                .upload_multipart(&target, &options.transfer, options.verify_integrity)
                .await
        };

        let report = LandingReport::from_upload(&target, size, report);
        let state = LandingState::terminal(report.outcome);
        match &report.detail {
            None => info!(state = %state, uri = %target, size, "Landing finished"),
            Some(detail) => warn!(state = %state, uri = %target, %detail, "Landing finished"),
        }
        report
    }

    async fn prepare(
        path: &Path,
        bucket: &str,
        key: Option<&str>,
        options: &LandingOptions,
    ) -> Result<(UploadTarget, u64)> {
        options.validate()?;
        let target = UploadTarget::new(bucket, path, key)?;
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| LandingError::local_io(path, e))?;
        if !meta.is_file() {
            return Err(LandingError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }
        Ok((target, meta.len()))
    }

    /// Land several files under `prefix`, at most `options.max_files_in_flight` at once
    ///
    /// Reports come back in input order; one failure does not stop the rest.
    pub async fn land_many(
        &self,
        files: &[PathBuf],
        bucket: &str,
        prefix: &str,
        options: &LandingOptions,
    ) -> Vec<LandingReport> {
        let in_flight = options.max_files_in_flight.max(1);
        let reports: Vec<LandingReport> = stream::iter(files)
            .map(|file| {
                let key = prefixed_key(prefix, file);
                async move { self.land(file, bucket, key.as_deref(), options).await }
            })
            .buffered(in_flight)
            .collect()
            .await;

        let verified = reports
            .iter()
            .filter(|r| r.outcome == TransferOutcome::Verified)
            .count();
        info!(files = reports.len(), verified, bucket, prefix, "Batch landing finished");
        reports
    }
}

fn prefixed_key(prefix: &str, file: &Path) -> Option<String> {
    let name = file.file_name()?.to_string_lossy();
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        Some(name.into_owned())
    } else {
        Some(format!("{}/{}", prefix, name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_key() {
        assert_eq!(
            prefixed_key("sales/20240130/", Path::new("/out/orders.csv")).as_deref(),
            Some("sales/20240130/orders.csv")
        );
        assert_eq!(prefixed_key("", Path::new("orders.csv")).as_deref(), Some("orders.csv"));
        assert_eq!(prefixed_key("x", Path::new("/")), None);
    }
}
