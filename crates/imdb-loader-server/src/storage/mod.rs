//! Storage backends for dataset artifacts
//!
//! An artifact is a flat name -> bytes entry (`title.basics.tsv.gz`,
//! `title.basics.tsv`). Two backends implement [`StorageBackend`]:
//!
//! - [`local::LocalBackend`]: a directory on the local filesystem
//! - [`s3::S3Backend`]: a bucket in an S3-compatible object store
//!
//! Exactly one is constructed at startup by [`init`] and shared as a
//! [`SharedBackend`]. Nothing else in the crate knows which one is active.
//!
//! # Write commit contract
//!
//! [`StorageBackend::open_write`] hands out an [`ArtifactSink`]. Bytes written
//! to a sink are invisible to [`StorageBackend::list`] and
//! [`StorageBackend::exists`] until [`ArtifactSink::commit`] returns. A sink
//! that is aborted, or dropped without committing, leaves nothing visible
//! under the artifact name. Writers to distinct names need no coordination;
//! two writers racing on the same name are not supported and the last commit
//! wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::info;

pub mod config;
pub mod local;
pub mod s3;

pub use config::StorageConfig;
pub use local::LocalBackend;
pub use s3::S3Backend;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The backend instance shared by every request and every spawned task
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Readable byte stream over a committed artifact
pub type ArtifactReader = Pin<Box<dyn AsyncRead + Send>>;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact name: {0:?}")]
    InvalidName(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// One visible artifact as reported by [`StorageBackend::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size_bytes: u64,
    /// Object stores only
    pub last_modified: Option<DateTime<Utc>>,
    /// Object stores only
    pub content_type: Option<String>,
}

impl ArtifactInfo {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            last_modified: None,
            content_type: None,
        }
    }
}

/// Write side of an artifact being created
///
/// Obtained from [`StorageBackend::open_write`]. Exactly one of
/// [`commit`](ArtifactSink::commit) or [`abort`](ArtifactSink::abort) should
/// be called; dropping the sink unfinished behaves like `abort`.
#[async_trait]
pub trait ArtifactSink: Send {
    /// Append one chunk
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()>;

    /// Make the artifact visible under its name; returns the bytes written
    async fn commit(self: Box<Self>) -> StorageResult<u64>;

    /// Discard everything written so far
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Capability shared by the local directory and the object store
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable location, e.g. `imdb_datasets` or `s3://bucket/prefix`
    fn location(&self) -> String;

    /// Create the directory or bucket if it does not exist yet
    async fn ensure_ready(&self) -> StorageResult<()>;

    async fn open_write(&self, name: &str) -> StorageResult<Box<dyn ArtifactSink>>;

    /// Fails with [`StorageError::NotFound`] if the artifact is absent
    async fn open_read(&self, name: &str) -> StorageResult<ArtifactReader>;

    async fn list(&self) -> StorageResult<Vec<ArtifactInfo>>;

    /// Fails with [`StorageError::NotFound`] if the artifact is absent
    async fn delete(&self, name: &str) -> StorageResult<()>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;
}

/// Build the configured backend
///
/// This is the only place the `use_object_store` switch is consulted.
pub async fn init(config: &StorageConfig) -> StorageResult<SharedBackend> {
    if config.use_object_store {
        let backend = S3Backend::new(&config.s3);
        info!(location = %backend.location(), "Using object storage for dataset artifacts");
        Ok(Arc::new(backend))
    } else {
        let backend = LocalBackend::new(&config.local.root);
        backend.remove_stale_writes().await?;
        info!(location = %backend.location(), "Using local storage for dataset artifacts");
        Ok(Arc::new(backend))
    }
}

/// Content type recorded for object-store writes
pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".gz") {
        "application/gzip"
    } else if name.ends_with(".tsv") {
        "text/tab-separated-values"
    } else {
        "application/octet-stream"
    }
}

/// Artifact names are flat: no separators, no parent references, no hidden files
pub(crate) fn validate_name(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("title.basics.tsv.gz"), "application/gzip");
        assert_eq!(content_type_for("title.basics.tsv"), "text/tab-separated-values");
        assert_eq!(content_type_for("notes.bin"), "application/octet-stream");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name.basics.tsv.gz").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("nested/name.tsv").is_err());
        assert!(validate_name("windows\\name.tsv").is_err());
        assert!(validate_name("bad\nname").is_err());
    }

    #[test]
    fn test_not_found_display() {
        let err = StorageError::NotFound("title.crew.tsv.gz".to_string());
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Artifact not found: title.crew.tsv.gz");
    }

    #[tokio::test]
    async fn test_init_selects_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::local(dir.path());
        config.use_object_store = false;

        let backend = init(&config).await.unwrap();
        assert_eq!(backend.location(), dir.path().display().to_string());
    }

    #[tokio::test]
    async fn test_init_sweeps_interrupted_local_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".title.basics.tsv.gz.abc123.part"), b"partial").unwrap();

        init(&StorageConfig::local(dir.path())).await.unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
