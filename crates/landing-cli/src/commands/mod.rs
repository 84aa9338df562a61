//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function returning the
//! process exit status.

pub mod compress;
pub mod digest;
pub mod extract;
pub mod upload;
