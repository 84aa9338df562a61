//! `landing upload` command implementation

use crate::config::{StorageArgs, TransferArgs};
use crate::error::Result;
use crate::output;
use landing_storage::Landing;
use std::path::Path;
use tracing::info;

/// Land one file and print its report
pub async fn run(
    storage: &StorageArgs,
    file: &Path,
    bucket: &str,
    key: Option<&str>,
    transfer: &TransferArgs,
    json: bool,
) -> Result<i32> {
    let options = transfer.to_options()?;
    let config = storage.to_config()?;
    info!(endpoint = ?config.endpoint, region = %config.region, "Connecting to object store");

    let landing = Landing::connect(&config).await?;
    let report = landing.land(file, bucket, key, &options).await;
    landing.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }
    Ok(report.exit_code())
}
