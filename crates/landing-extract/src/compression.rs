//! Zip archives of extraction output

use crate::error::{ExtractError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

/// Archive entry name: forward slashes regardless of platform
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `entries` (source path, entry name) to a new archive at `output`
fn write_archive(entries: &[(PathBuf, String)], output: &Path) -> Result<PathBuf> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = ZipWriter::new(BufWriter::new(File::create(output)?));

    for (source, name) in entries {
        writer.start_file(name.as_str(), options())?;
        let mut reader = BufReader::new(File::open(source)?);
        let bytes = std::io::copy(&mut reader, &mut writer)?;
        debug!(entry = %name, bytes, "Added archive entry");
    }

    writer.finish()?;
    info!(archive = %output.display(), entries = entries.len(), "Archive written");
    Ok(output.to_path_buf())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ExtractError::config(format!("not a file path: {}", path.display())))
}

/// Compress one file; the archive defaults to `<input>.zip`
pub fn compress_file(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let name = file_name(input)?;
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let mut archive = input.as_os_str().to_owned();
            archive.push(".zip");
            PathBuf::from(archive)
        },
    };
    write_archive(&[(input.to_path_buf(), name)], &output)
}

/// Compress several files into one flat archive
pub fn compress_files(inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
    let entries = inputs
        .iter()
        .map(|path| Ok((path.clone(), file_name(path)?)))
        .collect::<Result<Vec<_>>>()?;
    write_archive(&entries, output)
}

/// Every regular file under `dir`, recursively, sorted
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => ExtractError::Io(io),
            None => ExtractError::config("filesystem loop while walking directory"),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Compress a directory tree, keeping paths relative to `dir`
pub fn compress_directory(dir: &Path, output: &Path) -> Result<PathBuf> {
    let entries = collect_files(dir)?
        .into_iter()
        .filter(|path| path != output)
        .map(|path| {
            let name = entry_name(path.strip_prefix(dir).unwrap_or(&path));
            (path, name)
        })
        .collect::<Vec<_>>();
    write_archive(&entries, output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_entries(archive: &Path) -> Vec<(String, String)> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| {
                let mut entry = zip.by_index(i).unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_compress_file_default_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("orders.csv");
        std::fs::write(&input, "1,a\n2,b\n").unwrap();

        let archive = compress_file(&input, None).unwrap();
        assert_eq!(archive, dir.path().join("orders.csv.zip"));
        assert_eq!(read_entries(&archive), vec![("orders.csv".to_string(), "1,a\n2,b\n".to_string())]);
    }

    #[test]
    fn test_compress_files_flat() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("nested").join("b.csv");
        std::fs::create_dir_all(b.parent().unwrap()).unwrap();
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let archive = compress_files(&[a, b], &dir.path().join("out").join("all.zip")).unwrap();
        let names: Vec<_> = read_entries(&archive).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_compress_directory_keeps_relative_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("20240131");
        std::fs::create_dir_all(root.join("jade")).unwrap();
        std::fs::write(root.join("jade").join("t.csv"), "x").unwrap();
        std::fs::write(root.join("jade").join("t_format.xml"), "<x/>").unwrap();
        std::fs::write(root.join("readme.txt"), "r").unwrap();

        assert_eq!(collect_files(&root).unwrap().len(), 3);

        let archive = compress_directory(&root, &dir.path().join("20240131.zip")).unwrap();
        let names: Vec<_> = read_entries(&archive).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["jade/t.csv", "jade/t_format.xml", "readme.txt"]);
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = compress_file(&dir.path().join("absent.csv"), Some(&dir.path().join("a.zip"))).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
