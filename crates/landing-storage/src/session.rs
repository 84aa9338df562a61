//! Upload session: moves file bytes into the object store
//!
//! A session wraps one configured [`ObjectStore`] client. It is cheap to
//! clone and is shared read-only by concurrent uploads; [`UploadSession::close`]
//! releases it explicitly.
//!
//! Small files go up with one PUT carrying a `Content-MD5` header. Large
//! files are split into `chunk_size` parts with at most `max_concurrency`
//! parts in flight; a semaphore permit is taken before a part is read, which
//! bounds memory to `max_concurrency * chunk_size`.

use crate::config::{PollConfig, TransferConfig};
use crate::store::{CompletedPart, ObjectStore};
use crate::target::{LandingState, UploadReport, UploadTarget};
use crate::verify::VerificationGate;
use landing_common::checksum::{composite_digest, md5_hex_and_base64, normalize_etag};
use landing_common::{LandingError, Result};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct UploadSession<S: ObjectStore> {
    store: Arc<S>,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl<S: ObjectStore> Clone for UploadSession<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            poll: self.poll,
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: ObjectStore + 'static> UploadSession<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Stop work cooperatively when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Gate polling the same store this session writes to
    pub fn gate(&self) -> VerificationGate<S> {
        VerificationGate::new(Arc::clone(&self.store), self.poll)
    }

    /// Release this handle on the client
    ///
    /// The underlying client is dropped once the last clone is closed.
    pub fn close(self) {
        debug!(
            remaining_handles = Arc::strong_count(&self.store) - 1,
            "Upload session closed"
        );
    }

    fn check_cancelled(&self, target: &UploadTarget) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LandingError::Cancelled(format!("upload of {}", target)));
        }
        Ok(())
    }

    /// Upload a file with a single PUT
    ///
    /// With `verify_integrity` the body carries its `Content-MD5`, so the
    /// store rejects a corrupted write, and the returned ETag is compared to
    /// the local MD5 hex.
    #[instrument(skip_all, fields(uri = %target, verify_integrity))]
    pub async fn upload_single(&self, target: &UploadTarget, verify_integrity: bool) -> UploadReport {
        let body = match tokio::fs::read(&target.path).await {
            Ok(body) => body,
            Err(e) => return UploadReport::failed(&LandingError::local_io(&target.path, e)),
        };
        if let Err(e) = self.check_cancelled(target) {
            return UploadReport::failed(&e);
        }

        if !verify_integrity {
            debug!(state = %LandingState::Uploading, size = body.len(), "Uploading without integrity header");
            return match self.store.put_object(&target.bucket, &target.key, body, None).await {
                Ok(etag) => UploadReport::skipped(Some(normalize_etag(&etag).to_string()), 0),
                Err(e) => UploadReport::failed(&e),
            };
        }

        debug!(state = %LandingState::Digesting);
        let (expected, content_md5) = md5_hex_and_base64(&body);
        debug!(state = %LandingState::Uploading, size = body.len(), md5 = %expected, "Uploading with Content-MD5");

        let etag = match self
            .store
            .put_object(&target.bucket, &target.key, body, Some(&content_md5))
            .await
        {
            Ok(etag) => normalize_etag(&etag).to_string(),
            Err(e) => return UploadReport::failed(&e),
        };

        debug!(state = %LandingState::Verifying);
        if etag == expected {
            info!(etag = %etag, "Upload verified");
            UploadReport::verified(etag, 0)
        } else {
            warn!(expected = %expected, actual = %etag, "Returned ETag differs from local MD5");
            let err = LandingError::integrity_mismatch(&target.key, expected, etag.clone());
            UploadReport::unverified(err.to_detail(), Some(etag), 0)
        }
    }

    /// Upload a file in parts, then verify its composite identifier
    ///
    /// A file that fits in one part is sent with [`Self::upload_single`]: S3
    /// labels a one-part multipart object `md5(md5)-1`, which no window
    /// digest of the file reproduces.
    #[instrument(skip_all, fields(uri = %target, chunk_size = config.chunk_size))]
    pub async fn upload_multipart(
        &self,
        target: &UploadTarget,
        config: &TransferConfig,
        verify_integrity: bool,
    ) -> UploadReport {
        let size = match tokio::fs::metadata(&target.path).await {
            Ok(meta) => meta.len(),
            Err(e) => return UploadReport::failed(&LandingError::local_io(&target.path, e)),
        };
        let part_count = match config.validate().and_then(|_| config.check_part_count(size)) {
            Ok(parts) => parts,
            Err(e) => return UploadReport::failed(&e),
        };

        if part_count <= 1 {
            debug!(size, "File fits in one part, using a single PUT");
            return self.upload_single(target, verify_integrity).await;
        }

        debug!(state = %LandingState::Uploading, size, part_count);
        let (etag, parts) = match self.transfer_parts(target, config, size, part_count).await {
            Ok(done) => done,
            Err(e) => return UploadReport::failed(&e),
        };
        info!(etag = %etag, parts, "Multipart upload completed");

        if !verify_integrity {
            return UploadReport::skipped(Some(etag), parts);
        }

        debug!(state = %LandingState::Digesting);
        let expected = match self.expected_identifier(target, config).await {
            Ok(expected) => expected,
            Err(e) => {
                warn!(error = %e, "Could not compute the local composite digest");
                return UploadReport::unverified(e.to_detail(), Some(etag), parts);
            },
        };

        debug!(state = %LandingState::Verifying, expected = %expected);
        match self.gate().verify(target, &expected, &self.cancel).await {
            Ok(()) => UploadReport::verified(etag, parts),
            Err(e) => UploadReport::unverified(e.to_detail(), Some(etag), parts),
        }
    }

    async fn expected_identifier(&self, target: &UploadTarget, config: &TransferConfig) -> Result<String> {
        let path = target.path.clone();
        let chunk = config.chunk_len();
        tokio::task::spawn_blocking(move || composite_digest(path, chunk))
            .await
            .map_err(|e| LandingError::Unknown(format!("digest task failed: {}", e)))?
    }

    /// Create, fill and complete a multipart upload; abort it on any failure
    async fn transfer_parts(
        &self,
        target: &UploadTarget,
        config: &TransferConfig,
        size: u64,
        part_count: u64,
    ) -> Result<(String, usize)> {
        let upload_id = self
            .store
            .create_multipart_upload(&target.bucket, &target.key)
            .await?;
        debug!(upload_id = %upload_id, part_count, "Multipart upload created");

        let result = self
            .send_parts(target, config, size, part_count, &upload_id)
            .await;

        let completed = match result {
            Ok(parts) => {
                self.store
                    .complete_multipart_upload(&target.bucket, &target.key, &upload_id, &parts)
                    .await
                    .map(|etag| (normalize_etag(&etag).to_string(), parts.len()))
            },
            Err(e) => Err(e),
        };

        if let Err(ref e) = completed {
            warn!(upload_id = %upload_id, error = %e, "Aborting multipart upload");
            if let Err(abort_err) = self
                .store
                .abort_multipart_upload(&target.bucket, &target.key, &upload_id)
                .await
            {
                warn!(upload_id = %upload_id, error = %abort_err, "Abort failed, parts may linger");
            }
        }

        completed
    }

    async fn send_parts(
        &self,
        target: &UploadTarget,
        config: &TransferConfig,
        size: u64,
        part_count: u64,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(&target.path)
            .await
            .map_err(|e| LandingError::local_io(&target.path, e))?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        let failed = self.cancel.child_token();
        let mut tasks = JoinSet::new();
        let mut read_error = None;

        for index in 0..part_count {
            if failed.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = failed.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let offset = index * config.chunk_size;
            let len = config.chunk_size.min(size - offset);
            let mut body = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
            if let Err(e) = file.read_exact(&mut body).await {
                read_error = Some(LandingError::Io(e));
                failed.cancel();
                break;
            }

            let part_number = i32::try_from(index + 1)
                .map_err(|_| LandingError::config("part number out of range"))?;
            let store = Arc::clone(&self.store);
            let failed = failed.clone();
            let (bucket, key, upload_id) =
                (target.bucket.clone(), target.key.clone(), upload_id.to_string());

            tasks.spawn(async move {
                let _permit = permit;
                debug!(part_number, size = body.len(), "Uploading part");
                match store.upload_part(&bucket, &key, &upload_id, part_number, body).await {
                    Ok(etag) => Ok(CompletedPart { part_number, etag }),
                    Err(e) => {
                        failed.cancel();
                        Err(e)
                    },
                }
            });
        }

        let mut parts = Vec::with_capacity(tasks.len());
        let mut first_error = read_error;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(part)) => parts.push(part),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                },
                Err(e) => {
                    first_error.get_or_insert(LandingError::Unknown(format!("part task failed: {}", e)));
                },
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        self.check_cancelled(target)?;
        if parts.len() as u64 != part_count {
            return Err(LandingError::transport(format!(
                "{} of {} parts uploaded",
                parts.len(),
                part_count
            )));
        }

        parts.sort_by_key(|part| part.part_number);
        Ok(parts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::{FaultPlan, InMemoryObjectStore};
    use crate::store::ObjectMeta;
    use async_trait::async_trait;
    use landing_common::{ErrorKind, TransferOutcome};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// In-memory store with hooks into the multipart calls
    #[derive(Default)]
    struct HookedStore {
        inner: InMemoryObjectStore,
        part_delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        cancel_on_first_part: Option<CancellationToken>,
        remove_on_complete: Option<PathBuf>,
    }

    #[async_trait]
    impl ObjectStore for HookedStore {
        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Vec<u8>,
            content_md5: Option<&str>,
        ) -> Result<String> {
            self.inner.put_object(bucket, key, body, content_md5).await
        }

        async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
            self.inner.create_multipart_upload(bucket, key).await
        }

        async fn upload_part(
            &self,
            bucket: &str,
            key: &str,
            upload_id: &str,
            part_number: i32,
            body: Vec<u8>,
        ) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if part_number == 1 {
                if let Some(cancel) = &self.cancel_on_first_part {
                    cancel.cancel();
                }
            }
            tokio::time::sleep(self.part_delay).await;
            let result = self.inner.upload_part(bucket, key, upload_id, part_number, body).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn complete_multipart_upload(
            &self,
            bucket: &str,
            key: &str,
            upload_id: &str,
            parts: &[CompletedPart],
        ) -> Result<String> {
            if let Some(path) = &self.remove_on_complete {
                std::fs::remove_file(path).unwrap();
            }
            self.inner.complete_multipart_upload(bucket, key, upload_id, parts).await
        }

        async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
            self.inner.abort_multipart_upload(bucket, key, upload_id).await
        }

        async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
            self.inner.head_object(bucket, key).await
        }
    }

    fn hooked_session(store: HookedStore) -> UploadSession<HookedStore> {
        UploadSession::new(store).with_poll(PollConfig::new(3, Duration::from_millis(1)))
    }

    fn file_with(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn session(faults: FaultPlan) -> UploadSession<InMemoryObjectStore> {
        UploadSession::new(InMemoryObjectStore::with_faults(faults))
            .with_poll(PollConfig::new(3, Duration::from_millis(1)))
    }

    fn small_parts() -> TransferConfig {
        TransferConfig::new(4, 4, 2)
    }

    #[tokio::test]
    async fn test_single_verified() {
        let file = file_with(b"hello world");
        let target = UploadTarget::new("bucket", file.path(), Some("hello.txt")).unwrap();
        let session = session(FaultPlan::default());

        let report = session.upload_single(&target, true).await;
        assert_eq!(report.outcome, TransferOutcome::Verified);
        assert_eq!(report.etag.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert!(report.detail.is_none());
    }

    #[tokio::test]
    async fn test_single_rejected_content_md5_is_failed() {
        let file = file_with(b"hello world");
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let session = session(FaultPlan {
            corrupt_payloads: true,
            ..FaultPlan::default()
        });

        let report = session.upload_single(&target, true).await;
        assert_eq!(report.outcome, TransferOutcome::Failed);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::Transport);
        assert_eq!(session.store().object_count(), 0);
    }

    #[tokio::test]
    async fn test_single_missing_file() {
        let target = UploadTarget::new("bucket", "/nonexistent/landing/a.csv", None).unwrap();
        let report = session(FaultPlan::default()).upload_single(&target, true).await;
        assert_eq!(report.outcome, TransferOutcome::Failed);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_multipart_verified_and_parts_sorted() {
        let file = file_with(b"abcdefghij");
        let target = UploadTarget::new("bucket", file.path(), Some("ten.bin")).unwrap();
        let session = session(FaultPlan::default());

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::Verified, "{:?}", report.detail);
        assert_eq!(report.parts, 3);
        assert_eq!(report.etag.as_deref(), Some("446feba4c1b5cc7ad93bf4d44a0e36ac-3"));
        assert_eq!(session.store().object("bucket", "ten.bin").unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_multipart_single_window_uses_put() {
        let file = file_with(b"abc");
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let session = session(FaultPlan::default());

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::Verified);
        assert_eq!(report.parts, 0);
        assert_eq!(session.store().part_calls(), 0);
    }

    #[tokio::test]
    async fn test_multipart_part_failure_aborts() {
        let file = file_with(b"abcdefghij");
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let session = session(FaultPlan {
            failing_parts: [2].into_iter().collect(),
            ..FaultPlan::default()
        });

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::Failed);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::Transport);
        assert_eq!(session.store().aborted_uploads().len(), 1);
        assert_eq!(session.store().pending_uploads(), 0);
        assert_eq!(session.store().object_count(), 0);
    }

    #[tokio::test]
    async fn test_multipart_cancelled_is_failed_transport() {
        let file = file_with(b"abcdefghij");
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = session(FaultPlan::default()).with_cancellation(cancel);

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::Failed);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::Transport);
        assert_eq!(session.store().object_count(), 0);
        assert_eq!(session.store().aborted_uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_multipart_local_digest_failure_is_unverified_io() {
        let file = file_with(b"abcdefghij");
        let target = UploadTarget::new("bucket", file.path(), Some("ten.bin")).unwrap();
        let session = hooked_session(HookedStore {
            remove_on_complete: Some(file.path().to_path_buf()),
            ..HookedStore::default()
        });

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::UploadedUnverified);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::Io);
        assert_eq!(report.etag.as_deref(), Some("446feba4c1b5cc7ad93bf4d44a0e36ac-3"));
        assert_eq!(session.store().inner.object("bucket", "ten.bin").unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_multipart_parts_in_flight_bounded_by_concurrency() {
        let data: Vec<u8> = (0..40u8).collect();
        let file = file_with(&data);
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let session = hooked_session(HookedStore {
            part_delay: Duration::from_millis(20),
            ..HookedStore::default()
        });
        let config = TransferConfig::new(4, 4, 3);

        let report = session.upload_multipart(&target, &config, true).await;
        assert_eq!(report.outcome, TransferOutcome::Verified, "{:?}", report.detail);
        assert_eq!(report.parts, 10);

        let peak = session.store().peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= config.max_concurrency, "peak {} parts in flight", peak);
        assert!(peak > 1, "parts never overlapped");
    }

    #[tokio::test]
    async fn test_multipart_cancelled_mid_upload_aborts() {
        let data: Vec<u8> = (0..40u8).collect();
        let file = file_with(&data);
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let cancel = CancellationToken::new();
        let session = hooked_session(HookedStore {
            cancel_on_first_part: Some(cancel.clone()),
            ..HookedStore::default()
        })
        .with_cancellation(cancel);

        let report = session
            .upload_multipart(&target, &TransferConfig::new(4, 4, 1), true)
            .await;
        assert_eq!(report.outcome, TransferOutcome::Failed);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::Transport);
        assert!(session.store().inner.part_calls() < 10);
        assert_eq!(session.store().inner.aborted_uploads().len(), 1);
        assert_eq!(session.store().inner.object_count(), 0);
    }

    #[tokio::test]
    async fn test_multipart_never_visible_is_unverified() {
        let file = file_with(b"abcdefghij");
        let target = UploadTarget::new("bucket", file.path(), None).unwrap();
        let session = session(FaultPlan {
            invisible_heads: 10,
            ..FaultPlan::default()
        });

        let report = session.upload_multipart(&target, &small_parts(), true).await;
        assert_eq!(report.outcome, TransferOutcome::UploadedUnverified);
        assert_eq!(report.detail.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_close_releases_handle() {
        let session = session(FaultPlan::default());
        let clone = session.clone();
        assert_eq!(Arc::strong_count(session.store()), 2);
        clone.close();
        assert_eq!(Arc::strong_count(session.store()), 1);
    }
}
