//! File registry
//!
//! Summaries and bulk deletion of whatever the active backend holds.

use chrono::{DateTime, Utc};
use imdb_loader_common::units::bytes_to_mb;
use serde::Serialize;
use tracing::{info, instrument};

use crate::storage::{ArtifactInfo, StorageBackend, StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub size_bytes: u64,
    /// Rounded to two decimals
    pub size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl From<ArtifactInfo> for FileMetadata {
    fn from(artifact: ArtifactInfo) -> Self {
        Self {
            size_mb: bytes_to_mb(artifact.size_bytes),
            name: artifact.name,
            size_bytes: artifact.size_bytes,
            last_modified: artifact.last_modified,
            content_type: artifact.content_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileListing {
    pub files: Vec<FileMetadata>,
    pub total_files: usize,
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted_files: Vec<String>,
    pub total_deleted: usize,
}

#[instrument(skip_all)]
pub async fn list_files(backend: &dyn StorageBackend) -> StorageResult<FileListing> {
    let files: Vec<FileMetadata> = backend.list().await?.into_iter().map(Into::into).collect();

    Ok(FileListing {
        total_files: files.len(),
        files,
        directory: backend.location(),
    })
}

/// Delete every visible artifact
///
/// Artifacts that disappear mid-sweep are skipped, not reported.
#[instrument(skip_all)]
pub async fn delete_all(backend: &dyn StorageBackend) -> StorageResult<DeleteReport> {
    let mut deleted_files = Vec::new();

    for artifact in backend.list().await? {
        match backend.delete(&artifact.name).await {
            Ok(()) => deleted_files.push(artifact.name),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    info!("Deleted {} files from {}", deleted_files.len(), backend.location());

    Ok(DeleteReport {
        total_deleted: deleted_files.len(),
        deleted_files,
    })
}
