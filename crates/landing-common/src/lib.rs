//! Landing Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the landing workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all workspace members:
//!
//! - **Error Handling**: `LandingError`, the `ErrorKind` taxonomy and result types
//! - **Checksums**: MD5 digests and S3-compatible composite identifiers
//! - **Types**: Transfer outcomes and structured error details
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Dates**: Timezone-aware date/time stamps used in output paths
//!
//! # Example
//!
//! ```no_run
//! use landing_common::checksum::{composite_digest, md5_file_hex};
//! use landing_common::Result;
//!
//! fn describe(path: &str) -> Result<()> {
//!     let whole = md5_file_hex(path)?;
//!     let etag = composite_digest(path, 8 * 1024 * 1024)?;
//!     tracing::info!(%whole, %etag, "computed digests");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod dates;
pub mod error;
pub mod logging;
pub mod types;

/// One mebibyte, the unit transfer sizes are configured in.
pub const MB: u64 = 1024 * 1024;

// Re-export commonly used types
pub use error::{LandingError, Result};
pub use types::{ErrorDetail, ErrorKind, TransferOutcome};
