//! IMDb Loader Common Library
//!
//! Shared utilities for the IMDb loader workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Units**: byte-size conversions used by file listings
//!
//! # Example
//!
//! ```no_run
//! use imdb_loader_common::{logging::LogConfig, units::format_file_size};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = imdb_loader_common::logging::init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!(size = %format_file_size(230_000_000), "Largest dataset");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;
pub mod units;

pub use logging::{init_logging, LogConfig};
pub use units::{bytes_to_mb, format_file_size};
