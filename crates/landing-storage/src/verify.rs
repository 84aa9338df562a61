//! Post-upload integrity check
//!
//! Polls object metadata until the object is visible, then compares its ETag
//! with the locally computed identifier. Both sides have provider quoting
//! stripped once; the comparison is exact.

use crate::config::PollConfig;
use crate::store::ObjectStore;
use crate::target::UploadTarget;
use landing_common::checksum::normalize_etag;
use landing_common::{LandingError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub struct VerificationGate<S: ObjectStore> {
    store: Arc<S>,
    poll: PollConfig,
}

impl<S: ObjectStore> VerificationGate<S> {
    pub fn new(store: Arc<S>, poll: PollConfig) -> Self {
        Self { store, poll }
    }

    /// Confirm the stored object carries `expected` as its identifier
    ///
    /// Returns `Ok(())` on a match. A mismatch is `IntegrityMismatch`, a
    /// store fault is `Transport`, an object that never shows up within the
    /// polling window is `NotFound`, and cancellation is `Cancelled`.
    #[instrument(skip_all, fields(uri = %target))]
    pub async fn verify(
        &self,
        target: &UploadTarget,
        expected: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let expected = normalize_etag(expected);

        for attempt in 1..=self.poll.max_attempts {
            if cancel.is_cancelled() {
                return Err(LandingError::Cancelled(format!("verification of {}", target)));
            }

            if let Some(meta) = self.store.head_object(&target.bucket, &target.key).await? {
                let actual = normalize_etag(&meta.etag);
                if actual == expected {
                    debug!(attempt, etag = %actual, "Remote identifier matches");
                    return Ok(());
                }
                warn!(expected = %expected, actual = %actual, "Remote identifier mismatch");
                return Err(LandingError::integrity_mismatch(&target.key, expected, actual));
            }

            debug!(attempt, max_attempts = self.poll.max_attempts, "Object not visible yet");
            if attempt < self.poll.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(LandingError::Cancelled(format!("verification of {}", target)));
                    }
                    _ = tokio::time::sleep(self.poll.interval) => {}
                }
            }
        }

        Err(LandingError::not_found(format!(
            "{} not visible after {} attempts",
            target, self.poll.max_attempts
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::{FaultPlan, InMemoryObjectStore};
    use landing_common::ErrorKind;
    use std::time::Duration;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    async fn gate_with(faults: FaultPlan, attempts: u32) -> (VerificationGate<InMemoryObjectStore>, UploadTarget) {
        let store = Arc::new(InMemoryObjectStore::with_faults(faults));
        store.put_object("bucket", "hello.txt", b"hello world".to_vec(), None).await.unwrap();
        let target = UploadTarget::new("bucket", "hello.txt", None).unwrap();
        let gate = VerificationGate::new(store, PollConfig::new(attempts, Duration::from_secs(5)));
        (gate, target)
    }

    #[tokio::test]
    async fn test_match_with_quoted_expected() {
        let (gate, target) = gate_with(FaultPlan::default(), 3).await;
        let cancel = CancellationToken::new();
        gate.verify(&target, HELLO_MD5, &cancel).await.unwrap();
        gate.verify(&target, &format!("'{}'", HELLO_MD5), &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_comparison_is_case_sensitive() {
        let (gate, target) = gate_with(FaultPlan::default(), 3).await;
        let err = gate
            .verify(&target, &HELLO_MD5.to_uppercase(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_visibility() {
        let faults = FaultPlan {
            invisible_heads: 2,
            ..FaultPlan::default()
        };
        let (gate, target) = gate_with(faults, 5).await;
        gate.verify(&target, HELLO_MD5, &CancellationToken::new()).await.unwrap();
        assert_eq!(gate.store.head_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_visible_is_not_found() {
        let faults = FaultPlan {
            invisible_heads: 100,
            ..FaultPlan::default()
        };
        let (gate, target) = gate_with(faults, 4).await;
        let err = gate.verify(&target, HELLO_MD5, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(gate.store.head_calls(), 4);
    }

    #[tokio::test]
    async fn test_head_fault_is_transport() {
        let faults = FaultPlan {
            fail_heads: true,
            ..FaultPlan::default()
        };
        let (gate, target) = gate_with(faults, 3).await;
        let err = gate.verify(&target, HELLO_MD5, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_cancelled_before_poll() {
        let (gate, target) = gate_with(FaultPlan::default(), 3).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gate.verify(&target, HELLO_MD5, &cancel).await.unwrap_err();
        assert!(matches!(err, LandingError::Cancelled(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
