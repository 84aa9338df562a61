//! Terminal rendering of reports

use colored::Colorize;
use landing_common::TransferOutcome;
use landing_storage::LandingReport;

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

pub fn outcome_label(outcome: TransferOutcome) -> String {
    let label = outcome.to_string();
    match outcome {
        TransferOutcome::Verified => label.green().bold().to_string(),
        TransferOutcome::UploadedUnverified => label.yellow().bold().to_string(),
        TransferOutcome::Failed => label.red().bold().to_string(),
    }
}

pub fn print_report(report: &LandingReport) {
    println!("{} s3://{}/{}", outcome_label(report.outcome), report.bucket, report.key);
    println!("  File:  {}", report.path.display());
    println!("  Size:  {}", format_bytes(report.size));
    if let Some(etag) = &report.etag {
        println!("  ETag:  {}", etag);
    }
    if report.parts > 0 {
        println!("  Parts: {}", report.parts);
    }
    if let Some(detail) = &report.detail {
        println!("  {} {}", "Detail:".dimmed(), detail);
    }
}

/// Worst exit code across several reports
pub fn combined_exit_code(reports: &[LandingReport]) -> i32 {
    reports.iter().map(LandingReport::exit_code).max().unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(25 * 1024 * 1024), "25.00 MB");
        assert_eq!(format_bytes(1099511627776), "1.00 TB");
    }

    #[test]
    fn test_outcome_label_text() {
        colored::control::set_override(false);
        assert_eq!(outcome_label(TransferOutcome::UploadedUnverified), "UPLOADED_UNVERIFIED");
    }

    #[test]
    fn test_combined_exit_code_empty() {
        assert_eq!(combined_exit_code(&[]), 0);
    }
}
