//! MD5 checksum utilities for upload integrity
//!
//! Two families live here:
//!
//! - [`digest`]: a whole-input MD5 of a file or string, read in one pass or in
//!   fixed windows, returned as raw bytes, hex, or base64.
//! - [`composite_digest`]: the identifier S3 assigns to a multipart object,
//!   `hex(md5(concat(md5(part_i)))) + "-" + part_count`. The value depends on
//!   the part boundaries, so it is only comparable to an object uploaded with
//!   the same chunk size.

use crate::error::{LandingError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Window size used when the caller asks for chunked reads without a size
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Input to [`digest`]
#[derive(Debug, Clone, Copy)]
pub enum DigestSource<'a> {
    /// Hash the contents of a local file
    File(&'a Path),
    /// Hash the UTF-8 bytes of a string
    Text(&'a str),
    /// Hash a buffer already in memory
    Bytes(&'a [u8]),
}

/// How [`digest`] reads its input and encodes the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestOptions {
    /// Read files in `chunk_size` windows instead of loading them whole
    pub chunked: bool,
    pub chunk_size: usize,
    /// Wrap the raw digest bytes in base64
    pub base64: bool,
    /// Return bytes instead of a string
    pub as_bytes: bool,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            chunked: false,
            chunk_size: DEFAULT_READ_CHUNK,
            base64: false,
            as_bytes: false,
        }
    }
}

impl DigestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunked = true;
        self.chunk_size = chunk_size;
        self
    }

    pub fn base64(mut self, enabled: bool) -> Self {
        self.base64 = enabled;
        self
    }

    pub fn as_bytes(mut self, enabled: bool) -> Self {
        self.as_bytes = enabled;
        self
    }
}

/// Encoded digest produced by [`digest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestOutput {
    Bytes(Vec<u8>),
    Text(String),
}

impl DigestOutput {
    /// Borrow the output as bytes regardless of variant
    pub fn as_slice(&self) -> &[u8] {
        match self {
            DigestOutput::Bytes(bytes) => bytes,
            DigestOutput::Text(text) => text.as_bytes(),
        }
    }

    /// The string form, if this output is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DigestOutput::Text(text) => Some(text),
            DigestOutput::Bytes(_) => None,
        }
    }
}

/// Compute the MD5 digest of a file or string
///
/// Chunked and unchunked reads of the same content always agree; chunking only
/// bounds memory use. A missing or unreadable file is an `Io` error.
pub fn digest(source: DigestSource<'_>, options: &DigestOptions) -> Result<DigestOutput> {
    let raw = match source {
        DigestSource::File(path) if options.chunked => {
            if options.chunk_size == 0 {
                return Err(LandingError::config("chunk size must be positive"));
            }
            let mut file = File::open(path)?;
            md5_reader(&mut file, options.chunk_size)?
        },
        DigestSource::File(path) => md5::compute(std::fs::read(path)?).0,
        DigestSource::Text(text) => md5::compute(text.as_bytes()).0,
        DigestSource::Bytes(bytes) => md5::compute(bytes).0,
    };

    Ok(encode(&raw, options))
}

fn encode(raw: &[u8; 16], options: &DigestOptions) -> DigestOutput {
    match (options.base64, options.as_bytes) {
        (true, true) => DigestOutput::Bytes(STANDARD.encode(raw).into_bytes()),
        (true, false) => DigestOutput::Text(STANDARD.encode(raw)),
        (false, true) => DigestOutput::Bytes(raw.to_vec()),
        (false, false) => DigestOutput::Text(hex::encode(raw)),
    }
}

/// Feed a reader into an MD5 context window by window
fn md5_reader<R: Read>(reader: &mut R, chunk_size: usize) -> Result<[u8; 16]> {
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; chunk_size];

    loop {
        let bytes_read = fill_window(reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(context.compute().0)
}

/// Read until `buffer` is full or the reader is exhausted
///
/// A short count means end of input; `read` alone may return partial windows.
pub fn fill_window<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Hex and base64 forms of one in-memory MD5, for a `Content-MD5` upload
pub fn md5_hex_and_base64(data: &[u8]) -> (String, String) {
    let raw = md5::compute(data).0;
    (hex::encode(raw), STANDARD.encode(raw))
}

/// Compute MD5 checksum of bytes as lowercase hex
pub fn compute_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Hex MD5 of a file, read in bounded windows
pub fn md5_file_hex(path: impl AsRef<Path>) -> Result<String> {
    let options = DigestOptions::new().chunked(1024 * 1024);
    match digest(DigestSource::File(path.as_ref()), &options)? {
        DigestOutput::Text(text) => Ok(text),
        DigestOutput::Bytes(bytes) => Ok(hex::encode(bytes)),
    }
}

/// Base64 MD5 of a file, the form expected by a `Content-MD5` header
pub fn md5_file_base64(path: impl AsRef<Path>) -> Result<String> {
    let options = DigestOptions::new().chunked(1024 * 1024).base64(true);
    match digest(DigestSource::File(path.as_ref()), &options)? {
        DigestOutput::Text(text) => Ok(text),
        DigestOutput::Bytes(bytes) => Ok(STANDARD.encode(bytes)),
    }
}

/// Verify MD5 checksum matches expected value
pub fn verify_md5(data: &[u8], expected_md5: &str) -> bool {
    compute_md5(data) == expected_md5
}

/// Identifier a store assigns to an object, as computed locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestResult {
    /// Plain MD5 hex of the whole content
    Whole(String),
    /// MD5 over concatenated part digests, tagged with the part count
    Composite { digest: String, parts: usize },
}

impl DigestResult {
    /// Combine per-part raw digests in part order
    pub fn from_part_digests(part_digests: &[[u8; 16]]) -> Self {
        match part_digests {
            [] => DigestResult::Whole(compute_md5(&[])),
            [single] => DigestResult::Whole(hex::encode(single)),
            parts => {
                let concatenated: Vec<u8> = parts.iter().flatten().copied().collect();
                DigestResult::Composite {
                    digest: compute_md5(&concatenated),
                    parts: parts.len(),
                }
            },
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, DigestResult::Composite { .. })
    }

    pub fn part_count(&self) -> Option<usize> {
        match self {
            DigestResult::Whole(_) => None,
            DigestResult::Composite { parts, .. } => Some(*parts),
        }
    }
}

impl std::fmt::Display for DigestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestResult::Whole(digest) => write!(f, "{}", digest),
            DigestResult::Composite { digest, parts } => write!(f, "{}-{}", digest, parts),
        }
    }
}

/// Compute the S3 multipart identifier a file would receive at `chunk_size`
pub fn expected_identifier(path: impl AsRef<Path>, chunk_size: usize) -> Result<DigestResult> {
    if chunk_size == 0 {
        return Err(LandingError::config("chunk size must be positive"));
    }

    let mut file = File::open(path.as_ref())?;
    let mut buffer = vec![0u8; chunk_size];
    let mut part_digests = Vec::new();

    loop {
        let bytes_read = fill_window(&mut file, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        part_digests.push(md5::compute(&buffer[..bytes_read]).0);
        if bytes_read < chunk_size {
            break;
        }
    }

    Ok(DigestResult::from_part_digests(&part_digests))
}

/// String form of [`expected_identifier`]
pub fn composite_digest(path: impl AsRef<Path>, chunk_size: usize) -> Result<String> {
    expected_identifier(path, chunk_size).map(|result| result.to_string())
}

/// Strip one pair of provider quotes from an ETag, e.g. `"abc-3"` becomes `abc-3`
pub fn normalize_etag(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}
