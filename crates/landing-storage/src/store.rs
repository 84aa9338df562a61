//! Object store seam
//!
//! The upload session only needs the handful of S3 operations below. The
//! production implementation is [`crate::s3::S3ObjectStore`]; tests run
//! against [`crate::memory::InMemoryObjectStore`].

use async_trait::async_trait;
use landing_common::Result;
use serde::{Deserialize, Serialize};

/// A part that was accepted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// What a HEAD request reveals about a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Raw ETag as returned, possibly quoted
    pub etag: String,
    pub size: u64,
}

/// Minimal S3 surface used for landing files
///
/// Errors must be classified: service and network failures are
/// `LandingError::Transport`. `head_object` reports a missing object as
/// `Ok(None)`, never as an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a whole object; `content_md5` is the base64 digest the store must check
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<&str>,
    ) -> Result<String>;

    /// Start a multipart upload and return its upload id
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;

    /// Upload one part (numbered from 1) and return its ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String>;

    /// Assemble the parts, which must be sorted by part number
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<&str>,
    ) -> Result<String> {
        (**self).put_object(bucket, key, body, content_md5).await
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        (**self).create_multipart_upload(bucket, key).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String> {
        (**self).upload_part(bucket, key, upload_id, part_number, body).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        (**self).complete_multipart_upload(bucket, key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        (**self).abort_multipart_upload(bucket, key, upload_id).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        (**self).head_object(bucket, key).await
    }
}
