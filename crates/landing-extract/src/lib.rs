//! Landing Extract
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Produces the files that get landed: bulk-copy dumps of source tables.
//!
//! - [`bcp`]: command builder for `format`, `out` and `queryout` runs
//! - [`catalog`]: table enumeration through `INFORMATION_SCHEMA`
//! - [`extract`]: per-database plan writing to `<root>/<YYYYMMDD>/<database>`
//! - [`compression`]: zip archives of the output
//!
//! # Example
//!
//! ```no_run
//! use landing_extract::{Extractor, ExtractRequest, SourceConnection, SqlcmdCatalog};
//!
//! # async fn run() -> landing_extract::Result<()> {
//! let connection = SourceConnection::trusted();
//! let extractor = Extractor::new(SqlcmdCatalog::new(connection.clone()));
//! let request = ExtractRequest::new("jade", "/data/extracts").connection(connection);
//! let summary = extractor.extract(&request).await?;
//! println!("{} files, {} failures", summary.files.len(), summary.failures.len());
//! # Ok(())
//! # }
//! ```

pub mod bcp;
pub mod catalog;
pub mod compression;
pub mod error;
pub mod extract;
pub mod process;

pub use bcp::{BcpCommand, BcpOperation, ExtractWindow, SourceConnection, TableRef};
pub use catalog::{SqlcmdCatalog, StaticCatalog, TableCatalog};
pub use error::{ExtractError, Result};
pub use extract::{ExtractMode, ExtractRequest, ExtractSummary, Extractor, TableFailure};
