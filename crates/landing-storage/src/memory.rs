//! In-memory object store (for testing)
//!
//! Reproduces the S3 ETag rules: a PUT gets the quoted MD5 hex of its body, a
//! completed multipart upload gets `"md5(concat(part md5s))-N"`. Faults can be
//! injected to exercise every outcome of the landing pipeline.

use crate::store::{CompletedPart, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use landing_common::{LandingError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Faults to inject into subsequent calls
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Part numbers whose upload always fails
    pub failing_parts: HashSet<i32>,
    /// Every PUT fails
    pub fail_puts: bool,
    /// Flip one byte of every body before it is stored
    pub corrupt_payloads: bool,
    /// Return a mutated ETag from writes and HEAD
    pub mutate_etags: bool,
    /// HEAD reports the object missing this many times after each write
    pub invisible_heads: u32,
    /// Every HEAD fails with a transport error
    pub fail_heads: bool,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    hidden_heads: u32,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, (Vec<u8>, String)>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    aborted: Vec<String>,
    next_upload_id: u64,
    part_calls: usize,
    head_calls: usize,
    faults: FaultPlan,
}

/// Thread-safe store living entirely in memory; data is lost on drop
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        let store = Self::default();
        store.lock().faults = faults;
        store
    }

    /// Replace the active fault plan
    pub fn set_faults(&self, faults: FaultPlan) {
        self.lock().faults = faults;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stored bytes of an object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
    }

    /// Stored (quoted) ETag of an object
    pub fn etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.etag.clone())
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Multipart uploads started but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Upload ids that were aborted, in order
    pub fn aborted_uploads(&self) -> Vec<String> {
        self.lock().aborted.clone()
    }

    pub fn part_calls(&self) -> usize {
        self.lock().part_calls
    }

    pub fn head_calls(&self) -> usize {
        self.lock().head_calls
    }

    fn store(state: &mut State, bucket: &str, key: &str, data: Vec<u8>, etag: String) -> String {
        let returned = if state.faults.mutate_etags {
            mutate(&etag)
        } else {
            etag.clone()
        };
        let hidden_heads = state.faults.invisible_heads;
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                etag,
                hidden_heads,
            },
        );
        returned
    }
}

fn quoted(digest: &str) -> String {
    format!("\"{}\"", digest)
}

fn corrupt(mut body: Vec<u8>) -> Vec<u8> {
    match body.first_mut() {
        Some(byte) => *byte ^= 0xFF,
        None => body.push(0),
    }
    body
}

/// Change the first hex digit of an ETag, keeping its quoting and suffix
fn mutate(etag: &str) -> String {
    let mut replaced = false;
    etag.chars()
        .map(|c| {
            if !replaced && c.is_ascii_hexdigit() {
                replaced = true;
                if c == '0' {
                    '1'
                } else {
                    '0'
                }
            } else {
                c
            }
        })
        .collect()
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<&str>,
    ) -> Result<String> {
        let mut state = self.lock();
        if state.faults.fail_puts {
            return Err(LandingError::transport(format!(
                "PutObject s3://{}/{} failed: injected fault",
                bucket, key
            )));
        }

        let body = if state.faults.corrupt_payloads {
            corrupt(body)
        } else {
            body
        };
        let digest = md5::compute(&body);

        if let Some(expected) = content_md5 {
            if STANDARD.encode(digest.0) != expected {
                return Err(LandingError::transport(format!(
                    "PutObject s3://{}/{} failed: BadDigest, Content-MD5 did not match the body",
                    bucket, key
                )));
            }
        }

        let etag = quoted(&hex::encode(digest.0));
        Ok(Self::store(&mut state, bucket, key, body, etag))
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let mut state = self.lock();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String> {
        let mut state = self.lock();
        state.part_calls += 1;

        if state.faults.failing_parts.contains(&part_number) {
            return Err(LandingError::transport(format!(
                "UploadPart {} of s3://{}/{} failed: injected fault",
                part_number, bucket, key
            )));
        }

        let body = if state.faults.corrupt_payloads {
            corrupt(body)
        } else {
            body
        };
        let etag = quoted(&hex::encode(md5::compute(&body).0));

        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| LandingError::transport(format!("NoSuchUpload: {}", upload_id)))?;
        upload.parts.insert(part_number, (body, etag.clone()));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let mut state = self.lock();
        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| LandingError::transport(format!("NoSuchUpload: {}", upload_id)))?;

        if upload.bucket != bucket || upload.key != key {
            return Err(LandingError::transport(format!(
                "Upload {} belongs to s3://{}/{}",
                upload_id, upload.bucket, upload.key
            )));
        }
        if parts.windows(2).any(|pair| pair[0].part_number >= pair[1].part_number) {
            return Err(LandingError::transport("InvalidPartOrder: parts must be ascending"));
        }

        let mut data = Vec::new();
        let mut digests = Vec::with_capacity(parts.len());
        for part in parts {
            let (body, etag) = upload.parts.get(&part.part_number).ok_or_else(|| {
                LandingError::transport(format!("InvalidPart: {} was never uploaded", part.part_number))
            })?;
            if etag != &part.etag {
                return Err(LandingError::transport(format!(
                    "InvalidPart: ETag mismatch for part {}",
                    part.part_number
                )));
            }
            data.extend_from_slice(body);
            digests.extend_from_slice(&md5::compute(body).0);
        }

        let etag = quoted(&format!("{:x}-{}", md5::compute(&digests), parts.len()));
        Ok(Self::store(&mut state, bucket, key, data, etag))
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.uploads.remove(upload_id);
        state.aborted.push(upload_id.to_string());
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let mut state = self.lock();
        state.head_calls += 1;

        if state.faults.fail_heads {
            return Err(LandingError::transport(format!(
                "HeadObject s3://{}/{} failed: injected fault",
                bucket, key
            )));
        }

        let mutate_etags = state.faults.mutate_etags;
        let Some(object) = state.objects.get_mut(&(bucket.to_string(), key.to_string())) else {
            return Ok(None);
        };
        if object.hidden_heads > 0 {
            object.hidden_heads -= 1;
            return Ok(None);
        }

        let etag = if mutate_etags {
            mutate(&object.etag)
        } else {
            object.etag.clone()
        };
        Ok(Some(ObjectMeta {
            etag,
            size: object.data.len() as u64,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_etag_is_quoted_md5() {
        let store = InMemoryObjectStore::new();
        let etag = store.put_object("b", "k", b"hello world".to_vec(), None).await.unwrap();
        assert_eq!(etag, "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"");

        let meta = store.head_object("b", "k").await.unwrap().unwrap();
        assert_eq!(meta.etag, etag);
        assert_eq!(meta.size, 11);
        assert!(store.head_object("b", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_md5_checked() {
        let store = InMemoryObjectStore::new();
        let good = "XrY7u+Ae7tCTyyK7j1rNww==";
        assert!(store.put_object("b", "k", b"hello world".to_vec(), Some(good)).await.is_ok());

        store.set_faults(FaultPlan {
            corrupt_payloads: true,
            ..FaultPlan::default()
        });
        let err = store
            .put_object("b", "k", b"hello world".to_vec(), Some(good))
            .await
            .unwrap_err();
        assert!(matches!(err, LandingError::Transport(_)));
    }

    #[tokio::test]
    async fn test_multipart_etag() {
        let store = InMemoryObjectStore::new();
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        let mut parts = Vec::new();
        for (n, chunk) in [&b"abcd"[..], &b"efgh"[..], &b"ij"[..]].into_iter().enumerate() {
            let part_number = n as i32 + 1;
            let etag = store.upload_part("b", "k", &id, part_number, chunk.to_vec()).await.unwrap();
            parts.push(CompletedPart { part_number, etag });
        }

        let etag = store.complete_multipart_upload("b", "k", &id, &parts).await.unwrap();
        assert_eq!(etag, "\"446feba4c1b5cc7ad93bf4d44a0e36ac-3\"");
        assert_eq!(store.object("b", "k").unwrap(), b"abcdefghij");
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_complete_rejects_unsorted_parts() {
        let store = InMemoryObjectStore::new();
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        let first = store.upload_part("b", "k", &id, 1, b"ab".to_vec()).await.unwrap();
        let second = store.upload_part("b", "k", &id, 2, b"cd".to_vec()).await.unwrap();
        let parts = vec![
            CompletedPart { part_number: 2, etag: second },
            CompletedPart { part_number: 1, etag: first },
        ];
        assert!(store.complete_multipart_upload("b", "k", &id, &parts).await.is_err());
    }

    #[tokio::test]
    async fn test_invisible_heads_then_visible() {
        let store = InMemoryObjectStore::with_faults(FaultPlan {
            invisible_heads: 2,
            ..FaultPlan::default()
        });
        store.put_object("b", "k", b"x".to_vec(), None).await.unwrap();
        assert!(store.head_object("b", "k").await.unwrap().is_none());
        assert!(store.head_object("b", "k").await.unwrap().is_none());
        assert!(store.head_object("b", "k").await.unwrap().is_some());
        assert_eq!(store.head_calls(), 3);
    }

    #[test]
    fn test_mutate_changes_first_hex_digit() {
        assert_eq!(mutate("\"abc-3\""), "\"0bc-3\"");
        assert_eq!(mutate("0ff"), "1ff");
    }
}
