//! IMDb Loader Server Library
//!
//! Acquires the IMDb non-commercial datasets into a local directory or an
//! S3-compatible bucket and exposes the pipeline over HTTP.
//!
//! # Overview
//!
//! - **Storage**: one [`storage::StorageBackend`] trait, a local and an S3 implementation
//! - **Acquisition**: concurrent streaming download and gzip extraction with per-item reports
//! - **Registry**: listing and bulk deletion of stored artifacts
//! - **API**: thin axum routes over the above
//!
//! # Example
//!
//! ```no_run
//! use imdb_loader_server::{api, config::Config, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let backend = storage::init(&config.storage).await?;
//!     api::serve(config, backend).await?;
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod middleware;
pub mod registry;
pub mod storage;

pub use error::AppError;
