use crate::config::{RetryMode, StorageConfig};
use crate::store::{CompletedPart, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart},
    Client,
};
use landing_common::{LandingError, Result};
use tracing::{debug, info, instrument};

/// [`ObjectStore`] backed by the AWS SDK
///
/// Retries are delegated to the SDK according to [`StorageConfig::max_attempts`]
/// and [`StorageConfig::retry_mode`]; an error returned from here has already
/// exhausted them.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            max_attempts = config.max_attempts,
            retry_mode = %config.retry_mode,
            "Initializing S3 client"
        );

        let retry = match config.retry_mode {
            RetryMode::Standard => RetryConfig::standard(),
            RetryMode::Adaptive => RetryConfig::adaptive(),
        }
        .with_max_attempts(config.max_attempts);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(retry);

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "landing-static",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, "S3 client initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn transport<E, R>(operation: &str, bucket: &str, key: &str, err: SdkError<E, R>) -> LandingError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    LandingError::transport(format!(
        "{} s3://{}/{} failed: {}",
        operation,
        bucket,
        key,
        DisplayErrorContext(&err)
    ))
}

fn require_etag(operation: &str, etag: Option<&str>) -> Result<String> {
    etag.map(str::to_string)
        .ok_or_else(|| LandingError::transport(format!("{} response carried no ETag", operation)))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body, content_md5), fields(size = body.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<&str>,
    ) -> Result<String> {
        debug!("Uploading to s3://{}/{}", bucket, key);

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_md5(content_md5.map(str::to_string))
            .send()
            .await
            .map_err(|e| transport("PutObject", bucket, key, e))?;

        require_etag("PutObject", output.e_tag())
    }

    #[instrument(skip(self))]
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transport("CreateMultipartUpload", bucket, key, e))?;

        output.upload_id().map(str::to_string).ok_or_else(|| {
            LandingError::transport("CreateMultipartUpload response carried no upload id")
        })
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| transport("UploadPart", bucket, key, e))?;

        require_etag("UploadPart", output.e_tag())
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|part| {
                        S3CompletedPart::builder()
                            .part_number(part.part_number)
                            .e_tag(&part.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| transport("CompleteMultipartUpload", bucket, key, e))?;

        require_etag("CompleteMultipartUpload", output.e_tag())
    }

    #[instrument(skip(self))]
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| transport("AbortMultipartUpload", bucket, key, e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMeta {
                etag: require_etag("HeadObject", output.e_tag())?,
                size: output
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or(0),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(transport("HeadObject", bucket, key, err)),
        }
    }
}
