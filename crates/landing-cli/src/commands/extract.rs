//! `landing extract` and `landing extract-format` command implementations

use crate::config::{SourceArgs, StorageArgs, TransferArgs};
use crate::error::{CliError, Result};
use crate::output;
use crate::{ModeArg, EXIT_FAILED, EXIT_VERIFIED};
use colored::Colorize;
use landing_extract::{
    ExtractMode, ExtractRequest, ExtractSummary, ExtractWindow, Extractor, SourceConnection, SqlcmdCatalog,
};
use landing_storage::{Landing, LandingReport};
use tracing::info;

/// Build the extraction mode from the window flags
pub fn extract_mode(
    mode: ModeArg,
    column: Option<&str>,
    last: Option<&str>,
    current: Option<&str>,
) -> Result<ExtractMode> {
    match mode {
        ModeArg::Full => Ok(ExtractMode::Full),
        ModeArg::Incremental => match (column, last, current) {
            (Some(column), Some(last), Some(current)) => {
                Ok(ExtractMode::Incremental(ExtractWindow::new(column, last, current)?))
            },
            _ => Err(CliError::usage(
                "incremental mode needs --lte-column, --last-extract-time and --current-extract-time",
            )),
        },
    }
}

fn request(source: &SourceArgs, connection: SourceConnection) -> ExtractRequest {
    let mut request = ExtractRequest::new(source.db.clone(), source.root.clone())
        .schemas(source.schemas.clone())
        .connection(connection)
        .parallelism(source.parallelism);
    if let Some(tables) = &source.tables {
        request = request.tables(tables.clone());
    }
    if let Some(date) = &source.date {
        request = request.date(date.clone());
    }
    request
}

fn extractor(source: &SourceArgs, connection: SourceConnection) -> Extractor<SqlcmdCatalog> {
    Extractor::new(SqlcmdCatalog::new(connection).program(&source.sqlcmd)).bcp_program(&source.bcp)
}

/// Dump tables, then optionally land the produced files
pub async fn run(
    storage: &StorageArgs,
    source: &SourceArgs,
    mode: ExtractMode,
    include_format: bool,
    landing: Option<(&str, &TransferArgs)>,
    json: bool,
) -> Result<i32> {
    // Upload settings are resolved before any dump runs
    let landing = match landing {
        Some((bucket, transfer)) => Some((bucket, transfer.to_options()?, storage.to_config()?)),
        None => None,
    };

    let connection = source.connection()?;
    let request = request(source, connection.clone())
        .mode(mode)
        .include_format(include_format);
    let summary = extractor(source, connection).extract(&request).await?;

    let mut reports = Vec::new();
    if let Some((bucket, options, config)) = landing {
        let prefix = summary.key_prefix();
        info!(bucket, prefix = %prefix, files = summary.files.len(), "Landing extracted files");
        let landing = Landing::connect(&config).await?;
        reports = landing.land_many(&summary.files, bucket, &prefix, &options).await;
        landing.close();
    }

    render(&summary, &reports, json)?;

    let extract_code = if summary.is_success() { EXIT_VERIFIED } else { EXIT_FAILED };
    Ok(extract_code.max(output::combined_exit_code(&reports)))
}

/// Write format files only
pub async fn run_format(source: &SourceArgs, json: bool) -> Result<i32> {
    let connection = source.connection()?;
    let request = request(source, connection.clone());
    let summary = extractor(source, connection).extract_format_only(&request).await?;

    render(&summary, &[], json)?;
    Ok(if summary.is_success() { EXIT_VERIFIED } else { EXIT_FAILED })
}

fn render(summary: &ExtractSummary, reports: &[LandingReport], json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "summary": summary,
            "landed": reports,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", "Output:".cyan().bold(), summary.output_dir.display());
    for file in &summary.files {
        println!("  {}", file.display());
    }
    for failure in &summary.failures {
        println!(
            "  {} {}.{}: {}",
            "FAILED".red().bold(),
            failure.schema,
            failure.table,
            failure.error
        );
    }
    if !reports.is_empty() {
        println!();
        println!("{}", "Landed:".cyan().bold());
        for report in reports {
            output::print_report(report);
        }
    }
    println!();
    println!(
        "{} {} files, {} failed tables",
        "Summary:".cyan().bold(),
        summary.files.len(),
        summary.failures.len()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mode_ignores_window_flags() {
        let mode = extract_mode(ModeArg::Full, Some("c"), None, None).unwrap();
        assert_eq!(mode, ExtractMode::Full);
    }

    #[test]
    fn test_incremental_mode_checks_window() {
        let mode = extract_mode(ModeArg::Incremental, Some("c"), Some("20240101"), Some("20240102")).unwrap();
        assert!(matches!(mode, ExtractMode::Incremental(_)));

        let err = extract_mode(ModeArg::Incremental, Some("c"), Some("20240102"), Some("20240101")).unwrap_err();
        assert!(matches!(err, CliError::Extract(_)));

        let err = extract_mode(ModeArg::Incremental, None, Some("1"), Some("2")).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }
}
