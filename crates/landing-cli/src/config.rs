//! Flag groups shared by several commands and their conversion into
//! library configuration
//!
//! Every flag falls back to an environment variable (and so to `.env`), and
//! unset flags fall back to the library defaults.

use crate::error::{CliError, Result};
use clap::Args;
use landing_extract::SourceConnection;
use landing_storage::config::mib_to_bytes;
use landing_storage::{LandingOptions, PollConfig, RetryMode, StorageConfig, TransferConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Object store connection flags
#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Custom S3-compatible endpoint, e.g. http://localhost:9000
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// AWS region
    #[arg(long, env = "S3_REGION", global = true)]
    pub region: Option<String>,

    /// Use path-style bucket addressing (MinIO)
    #[arg(long, env = "S3_PATH_STYLE", global = true)]
    pub path_style: bool,

    /// Maximum attempts per request, including the first
    #[arg(long, env = "S3_MAX_ATTEMPTS", global = true)]
    pub max_attempts: Option<u32>,

    /// Retry strategy: standard or adaptive
    #[arg(long, env = "S3_RETRY_MODE", global = true)]
    pub retry_mode: Option<String>,
}

impl StorageArgs {
    /// Flags over `StorageConfig::from_env`
    pub fn to_config(&self) -> Result<StorageConfig> {
        let base = StorageConfig::from_env()?;
        let retry_mode = match &self.retry_mode {
            Some(mode) => mode.parse::<RetryMode>()?,
            None => base.retry_mode,
        };
        let config = StorageConfig {
            endpoint: self.endpoint.clone().or(base.endpoint),
            region: self.region.clone().unwrap_or(base.region),
            path_style: self.path_style || base.path_style,
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            retry_mode,
            ..base
        };
        config.validate()?;
        Ok(config)
    }
}

/// Upload tuning flags
#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    /// Part size in MiB
    #[arg(long, env = "LANDING_CHUNK_SIZE_MB")]
    pub chunk_size_mb: Option<u64>,

    /// Files at or above this size (MiB) use multipart upload
    #[arg(long, env = "LANDING_MULTIPART_THRESHOLD_MB")]
    pub threshold_mb: Option<u64>,

    /// Parts in flight at once
    #[arg(long, env = "LANDING_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// Skip the remote integrity check
    #[arg(long)]
    pub no_verify: bool,

    /// Visibility checks before giving up on verification
    #[arg(long, env = "LANDING_POLL_ATTEMPTS")]
    pub poll_attempts: Option<u32>,

    /// Seconds between visibility checks
    #[arg(long, env = "LANDING_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,
}

impl TransferArgs {
    pub fn to_options(&self) -> Result<LandingOptions> {
        let base = TransferConfig::from_env()?;
        let transfer = TransferConfig::new(
            self.chunk_size_mb.map(mib_to_bytes).transpose()?.unwrap_or(base.chunk_size),
            self.threshold_mb
                .map(mib_to_bytes)
                .transpose()?
                .unwrap_or(base.multipart_threshold),
            self.max_concurrency.unwrap_or(base.max_concurrency),
        );

        let default_poll = PollConfig::default();
        let poll = PollConfig::new(
            self.poll_attempts.unwrap_or(default_poll.max_attempts),
            self.poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default_poll.interval),
        );

        let options = LandingOptions::default()
            .with_transfer(transfer)
            .with_poll(poll)
            .verify_integrity(!self.no_verify);
        options.validate()?;
        Ok(options)
    }
}

/// Source database flags
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source database name
    #[arg(long, env = "LANDING_DB")]
    pub db: String,

    /// Tables to extract (comma separated); all base tables when omitted
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub tables: Option<Vec<String>>,

    /// Schemas to extract from (comma separated)
    #[arg(long, value_delimiter = ',', num_args = 1.., default_value = "dbo")]
    pub schemas: Vec<String>,

    /// Server or instance name; the local default instance when omitted
    #[arg(long, env = "SOURCE_SERVER")]
    pub server: Option<String>,

    /// SQL login; a trusted connection is used unless both login and password are set
    #[arg(long, env = "SOURCE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "SOURCE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Output root; files land under <root>/<YYYYMMDD>/<db>
    #[arg(long, env = "LANDING_EXTRACT_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Date stamp (YYYYMMDD); today in UTC when omitted
    #[arg(long)]
    pub date: Option<String>,

    /// Tables extracted at once
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// bcp executable
    #[arg(long, env = "BCP_PATH", default_value = "bcp")]
    pub bcp: PathBuf,

    /// sqlcmd executable, used to list tables
    #[arg(long, env = "SQLCMD_PATH", default_value = "sqlcmd")]
    pub sqlcmd: PathBuf,
}

impl SourceArgs {
    pub fn connection(&self) -> Result<SourceConnection> {
        let connection = match (&self.username, &self.password) {
            (Some(user), Some(password)) => SourceConnection::with_login(user.clone(), password.clone()),
            (None, None) => SourceConnection::trusted(),
            _ => {
                return Err(CliError::usage("--username and --password must be given together"));
            },
        };
        Ok(match &self.server {
            Some(server) => connection.server(server.clone()),
            None => connection,
        })
    }
}
