//! `landing compress` command implementation

use crate::error::{CliError, Result};
use crate::EXIT_VERIFIED;
use landing_extract::compression;
use std::path::{Path, PathBuf};

fn default_archive(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

/// Zip the inputs and return the archive path
///
/// A single directory keeps its relative layout, a single file defaults to
/// `<file>.zip`, and several files need `--output`.
pub fn compress(inputs: &[PathBuf], output: Option<&Path>) -> Result<PathBuf> {
    for input in inputs {
        if !input.exists() {
            return Err(CliError::FileNotFound(input.display().to_string()));
        }
    }

    let archive = match inputs {
        [] => return Err(CliError::usage("at least one input is required")),
        [dir] if dir.is_dir() => {
            let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_archive(dir));
            compression::compress_directory(dir, &output)?
        },
        [file] => compression::compress_file(file, output)?,
        files => {
            if files.iter().any(|f| f.is_dir()) {
                return Err(CliError::usage("directories can only be compressed on their own"));
            }
            let output = output.ok_or_else(|| CliError::usage("--output is required with several inputs"))?;
            compression::compress_files(files, output)?
        },
    };
    Ok(archive)
}

pub fn run(inputs: &[PathBuf], output: Option<&Path>) -> Result<i32> {
    let archive = compress(inputs, output)?;
    println!("{}", archive.display());
    Ok(EXIT_VERIFIED)
}
