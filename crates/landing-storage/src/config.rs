//! Storage and transfer configuration
//!
//! Values come from the environment (optionally seeded from `.env` by the
//! binary) and can be overridden field by field from CLI flags.

use crate::limits::{MAX_PARTS, MAX_PART_SIZE, MAX_SINGLE_PUT_SIZE, MIN_PART_SIZE};
use landing_common::{LandingError, Result, MB};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Client-side retry strategy of the AWS SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    #[default]
    Standard,
    Adaptive,
}

impl std::str::FromStr for RetryMode {
    type Err = LandingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            other => Err(LandingError::config(format!(
                "Invalid retry mode '{}', expected standard or adaptive",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RetryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryMode::Standard => write!(f, "standard"),
            RetryMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Connection settings for the object store client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack)
    pub endpoint: Option<String>,
    pub region: String,
    pub path_style: bool,
    pub max_attempts: u32,
    pub retry_mode: RetryMode,
    /// Named profile for the default credential chain
    pub profile: Option<String>,
    /// Static credentials; both or neither
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            path_style: false,
            max_attempts: 3,
            retry_mode: RetryMode::Standard,
            profile: None,
            access_key: None,
            secret_key: None,
        }
    }
}

impl StorageConfig {
    /// Read `S3_*` / `AWS_*` variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or(defaults.region),
            path_style: parse_env("S3_PATH_STYLE")?.unwrap_or(defaults.path_style),
            max_attempts: parse_env("S3_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            retry_mode: match env::var("S3_RETRY_MODE") {
                Ok(mode) => mode.parse()?,
                Err(_) => defaults.retry_mode,
            },
            profile: env::var("AWS_PROFILE").ok().filter(|v| !v.is_empty()),
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Local MinIO with its default credentials
    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            path_style: true,
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(LandingError::config("region must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(LandingError::config("max retry attempts must be at least 1"));
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(LandingError::config(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be provided together",
            ));
        }
        Ok(())
    }
}

/// How a file is split and sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Part size in bytes; also the window of the expected composite digest
    pub chunk_size: u64,
    /// Files at or above this size go through the multipart path
    pub multipart_threshold: u64,
    /// Parts in flight at once
    pub max_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25 * MB,
            multipart_threshold: 25 * MB,
            max_concurrency: 10,
        }
    }
}

impl TransferConfig {
    pub fn new(chunk_size: u64, multipart_threshold: u64, max_concurrency: usize) -> Self {
        Self {
            chunk_size,
            multipart_threshold,
            max_concurrency,
        }
    }

    /// `LANDING_CHUNK_SIZE_MB`, `LANDING_MULTIPART_THRESHOLD_MB`, `LANDING_MAX_CONCURRENCY`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            chunk_size: parse_env::<u64>("LANDING_CHUNK_SIZE_MB")?
                .map(mib_to_bytes)
                .transpose()?
                .unwrap_or(defaults.chunk_size),
            multipart_threshold: parse_env::<u64>("LANDING_MULTIPART_THRESHOLD_MB")?
                .map(mib_to_bytes)
                .transpose()?
                .unwrap_or(defaults.multipart_threshold),
            max_concurrency: parse_env("LANDING_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(LandingError::config("chunk size must be positive"));
        }
        if self.multipart_threshold == 0 {
            return Err(LandingError::config("multipart threshold must be positive"));
        }
        if self.max_concurrency == 0 {
            return Err(LandingError::config("max concurrency must be positive"));
        }
        if self.chunk_size > MAX_PART_SIZE {
            return Err(LandingError::config(format!(
                "chunk size {} exceeds the S3 part limit of {} bytes",
                self.chunk_size, MAX_PART_SIZE
            )));
        }
        // Files below the threshold go up in one PUT
        if self.multipart_threshold > MAX_SINGLE_PUT_SIZE + 1 {
            return Err(LandingError::config(format!(
                "multipart threshold {} lets single PUTs exceed the S3 limit of {} bytes",
                self.multipart_threshold, MAX_SINGLE_PUT_SIZE
            )));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(LandingError::config("chunk size does not fit in memory"));
        }
        if self.chunk_size < MIN_PART_SIZE {
            warn!(
                chunk_size = self.chunk_size,
                min = MIN_PART_SIZE,
                "Chunk size below the S3 minimum part size; real S3 rejects non-final parts this small"
            );
        }
        Ok(())
    }

    /// Number of parts a file of `size` bytes is split into
    pub fn part_count(&self, size: u64) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        size.div_ceil(self.chunk_size)
    }

    /// Reject files that would need more parts than the store accepts
    pub fn check_part_count(&self, size: u64) -> Result<u64> {
        let parts = self.part_count(size);
        if parts > MAX_PARTS {
            return Err(LandingError::config(format!(
                "{} bytes at chunk size {} needs {} parts, more than the limit of {}",
                size, self.chunk_size, parts, MAX_PARTS
            )));
        }
        Ok(parts)
    }

    pub(crate) fn chunk_len(&self) -> usize {
        usize::try_from(self.chunk_size).unwrap_or(usize::MAX)
    }
}

/// Polling schedule for the remote visibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    /// 20 attempts every 5 seconds, the S3 `ObjectExists` waiter schedule
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Per-call options for landing a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandingOptions {
    pub transfer: TransferConfig,
    pub verify_integrity: bool,
    pub poll: PollConfig,
    /// Files landed concurrently by `land_many`
    pub max_files_in_flight: usize,
}

impl Default for LandingOptions {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            verify_integrity: true,
            poll: PollConfig::default(),
            max_files_in_flight: 4,
        }
    }
}

impl LandingOptions {
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn verify_integrity(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.transfer.validate()?;
        if self.poll.max_attempts == 0 {
            return Err(LandingError::config("poll attempts must be at least 1"));
        }
        if self.max_files_in_flight == 0 {
            return Err(LandingError::config("files in flight must be positive"));
        }
        Ok(())
    }
}

/// Convert a MiB count from a flag or variable to bytes
pub fn mib_to_bytes(mb: u64) -> Result<u64> {
    mb.checked_mul(MB)
        .ok_or_else(|| LandingError::config(format!("{} MiB does not fit in a byte count", mb)))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LandingError::config(format!("Invalid value for {}: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
