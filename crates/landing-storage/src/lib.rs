//! Landing Storage
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Verified uploads of local files into an S3 landing zone.
//!
//! # Overview
//!
//! - **Store seam**: [`ObjectStore`] with an AWS SDK implementation
//!   ([`S3ObjectStore`]) and an in-memory one for tests ([`InMemoryObjectStore`])
//! - **Upload session**: single PUT with `Content-MD5`, or bounded-concurrency
//!   multipart upload that aborts on failure
//! - **Verification gate**: polls object metadata and compares the ETag with
//!   the locally computed (composite) MD5
//! - **Landing**: one call per file returning a [`LandingReport`] whose
//!   outcome is `VERIFIED`, `UPLOADED_UNVERIFIED` or `FAILED`
//!
//! # Example
//!
//! ```no_run
//! use landing_storage::{Landing, LandingOptions, StorageConfig};
//!
//! # async fn run() -> landing_common::Result<()> {
//! let landing = Landing::connect(&StorageConfig::from_env()?).await?;
//! let report = landing
//!     .land("out/20240130/sales/orders.csv", "landing-zone", None, &LandingOptions::default())
//!     .await;
//! println!("{} {:?}", report.outcome, report.detail);
//! landing.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod landing;
pub mod limits;
pub mod memory;
pub mod s3;
pub mod session;
pub mod store;
pub mod target;
pub mod verify;

pub use config::{LandingOptions, PollConfig, RetryMode, StorageConfig, TransferConfig};
pub use landing::Landing;
pub use memory::{FaultPlan, InMemoryObjectStore};
pub use s3::S3ObjectStore;
pub use session::UploadSession;
pub use store::{CompletedPart, ObjectMeta, ObjectStore};
pub use target::{LandingReport, LandingState, UploadReport, UploadTarget};
pub use verify::VerificationGate;
