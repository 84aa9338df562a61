//! `landing digest` command implementation

use crate::error::{CliError, Result};
use crate::EXIT_VERIFIED;
use clap::Args;
use landing_common::checksum::{self, DigestOptions, DigestSource};
use landing_storage::config::mib_to_bytes;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct DigestArgs {
    /// File to hash
    #[arg(required_unless_present = "text")]
    pub file: Option<PathBuf>,

    /// Hash this string instead of a file
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the file in windows instead of loading it whole
    #[arg(long)]
    pub chunked: bool,

    /// Window size in bytes for --chunked
    #[arg(long, default_value_t = 8192)]
    pub chunk_size: usize,

    /// Base64 instead of hex
    #[arg(long, conflicts_with = "composite")]
    pub base64: bool,

    /// The ETag S3 would report for a multipart upload of the file
    #[arg(long, requires = "file", conflicts_with = "text")]
    pub composite: bool,

    /// Part size in MiB for --composite
    #[arg(long, env = "LANDING_CHUNK_SIZE_MB", default_value_t = 25)]
    pub chunk_size_mb: u64,
}

/// Compute the digest `args` describe
pub fn compute(args: &DigestArgs) -> Result<String> {
    if let Some(file) = &args.file {
        if !file.is_file() {
            return Err(CliError::FileNotFound(file.display().to_string()));
        }
    }

    if args.composite {
        let file = args
            .file
            .as_deref()
            .ok_or_else(|| CliError::usage("--composite needs a file"))?;
        let part_size = mib_to_bytes(args.chunk_size_mb)
            .ok()
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or_else(|| CliError::usage("--chunk-size-mb is too large"))?;
        return Ok(checksum::composite_digest(file, part_size)?);
    }

    let mut options = DigestOptions::new().base64(args.base64);
    if args.chunked {
        options = options.chunked(args.chunk_size);
    }
    let source = match (&args.file, &args.text) {
        (Some(file), _) => DigestSource::File(file),
        (None, Some(text)) => DigestSource::Text(text),
        (None, None) => return Err(CliError::usage("a file or --text is required")),
    };

    let output = checksum::digest(source, &options)?;
    Ok(String::from_utf8_lossy(output.as_slice()).into_owned())
}

pub fn run(args: &DigestArgs) -> Result<i32> {
    println!("{}", compute(args)?);
    Ok(EXIT_VERIFIED)
}
