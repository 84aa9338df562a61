//! Landing CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use landing_cli::{Cli, EXIT_FAILED};
use landing_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, LoggingGuard};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // The CLI works without logging
    let _guard = match setup_logging(cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    let code = match landing_cli::execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{} {}", "Error:".red().bold(), e);
            EXIT_FAILED
        },
    };

    process::exit(code);
}

/// Warnings to the console by default, debug with `--verbose`; `LOG_*` variables win
fn setup_logging(verbose: bool) -> anyhow::Result<LoggingGuard> {
    let level = if verbose { LogLevel::Debug } else { LogLevel::Warn };
    let config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("landing")
        .build()
        .with_env_overrides()
        .context("Invalid LOG_* environment variable")?;
    init_logging(&config)
}
