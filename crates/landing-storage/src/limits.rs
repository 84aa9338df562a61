//! S3 service limits
//!
//! See <https://docs.aws.amazon.com/AmazonS3/latest/userguide/qfacts.html>.

/// Smallest non-final part a multipart upload accepts (5 MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest single part (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Parts per multipart upload, numbered 1..=10,000
pub const MAX_PARTS: u64 = 10_000;

/// Largest object a single PUT can create (5 GiB)
pub const MAX_SINGLE_PUT_SIZE: u64 = MAX_PART_SIZE;
