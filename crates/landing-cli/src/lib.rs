//! Landing CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line interface for moving extracted files into an S3 landing zone.
//!
//! # Overview
//!
//! - **Upload**: land one file with integrity verification (`landing upload`)
//! - **Digest**: MD5 or S3-compatible composite digests (`landing digest`)
//! - **Extract**: bcp dumps of a source database, optionally landed (`landing extract`)
//! - **Format files**: bcp XML format files only (`landing extract-format`)
//! - **Compress**: zip files or directories (`landing compress`)
//!
//! Exit codes: 0 verified, 1 uploaded but unverified, 2 failed.

pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use commands::digest::DigestArgs;
use config::{SourceArgs, StorageArgs, TransferArgs};
use std::path::PathBuf;

/// Exit status when every file was verified
pub const EXIT_VERIFIED: i32 = 0;
/// Exit status when something was uploaded but not verified
pub const EXIT_UNVERIFIED: i32 = 1;
/// Exit status when an operation failed
pub const EXIT_FAILED: i32 = 2;

/// Landing - verified uploads into an S3 landing zone
#[derive(Parser, Debug)]
#[command(name = "landing")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub storage: StorageArgs,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file and verify it landed intact
    Upload {
        /// File to upload
        file: PathBuf,

        /// Destination bucket
        #[arg(short, long, env = "LANDING_BUCKET")]
        bucket: String,

        /// Object key (defaults to the file name)
        #[arg(short, long)]
        key: Option<String>,

        #[command(flatten)]
        transfer: TransferArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the MD5 digest of a file or string
    Digest(DigestArgs),

    /// Dump source tables with bcp
    Extract {
        #[command(flatten)]
        source: SourceArgs,

        /// Whole tables or a change window
        #[arg(long, value_enum, default_value_t = ModeArg::Full)]
        mode: ModeArg,

        /// Change-tracking column for incremental mode
        #[arg(long, required_if_eq("mode", "incremental"))]
        lte_column: Option<String>,

        /// Exclusive lower bound for incremental mode
        #[arg(long, required_if_eq("mode", "incremental"))]
        last_extract_time: Option<String>,

        /// Inclusive upper bound for incremental mode
        #[arg(long, required_if_eq("mode", "incremental"))]
        current_extract_time: Option<String>,

        /// Skip the XML format files
        #[arg(long)]
        no_format: bool,

        /// Land the produced files in this bucket under <db>/<date>/
        #[arg(long)]
        land_bucket: Option<String>,

        #[command(flatten)]
        transfer: TransferArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write bcp XML format files only
    ExtractFormat {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zip files or a directory
    Compress {
        /// Files, or a single directory
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Archive path (defaults to <input>.zip for a single input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Full,
    Incremental,
}

/// Run the parsed command, returning the process exit status
pub async fn execute(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::Upload {
            file,
            bucket,
            key,
            transfer,
            json,
        } => {
            commands::upload::run(&cli.storage, file, bucket, key.as_deref(), transfer, *json).await
        },

        Commands::Digest(args) => commands::digest::run(args),

        Commands::Extract {
            source,
            mode,
            lte_column,
            last_extract_time,
            current_extract_time,
            no_format,
            land_bucket,
            transfer,
            json,
        } => {
            let mode = commands::extract::extract_mode(
                *mode,
                lte_column.as_deref(),
                last_extract_time.as_deref(),
                current_extract_time.as_deref(),
            )?;
            let landing = land_bucket.as_deref().map(|bucket| (bucket, transfer));
            commands::extract::run(&cli.storage, source, mode, !no_format, landing, *json).await
        },

        Commands::ExtractFormat { source, json } => commands::extract::run_format(source, *json).await,

        Commands::Compress { inputs, output } => commands::compress::run(inputs, output.as_deref()),
    }
}
