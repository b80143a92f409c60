//! Local filesystem backend
//!
//! Artifacts are plain files directly under one root directory. A write goes
//! to a hidden temporary file next to its destination (`.<name>.<uuid>.part`)
//! and is renamed into place on commit, so readers only ever see complete
//! files. Temporary files are skipped by [`LocalBackend::list`], and ones
//! orphaned by a crash are swept by [`LocalBackend::remove_stale_writes`] at
//! startup.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::{
    validate_name, ArtifactInfo, ArtifactReader, ArtifactSink, StorageBackend, StorageError,
    StorageResult,
};

const TEMP_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        let unique = uuid::Uuid::new_v4().simple();
        self.root.join(format!(".{}.{}{}", name, unique, TEMP_SUFFIX))
    }

    /// Remove temp files orphaned by a process that died mid-write
    ///
    /// Must run before any write starts, since in-flight writes use the same
    /// temp names. Returns the number of files removed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn remove_stale_writes(&self) -> StorageResult<usize> {
        let context = || format!("Failed to scan {}", self.root.display());

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(context(), e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(context(), e))?
        {
            let is_temp = entry.file_name().to_str().is_some_and(is_temp_name);
            if !is_temp {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::io(
                        format!("Failed to remove {}", entry.path().display()),
                        e,
                    ))
                }
            }
        }

        if removed > 0 {
            warn!(removed, "Removed temp files left by an interrupted write");
        }
        Ok(removed)
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

fn not_found_or(name: &str, context: String, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::io(context, err)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn ensure_ready(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StorageError::io(format!("Failed to create directory {}", self.root.display()), e)
        })
    }

    #[instrument(skip(self))]
    async fn open_write(&self, name: &str) -> StorageResult<Box<dyn ArtifactSink>> {
        let final_path = self.path_for(name)?;
        self.ensure_ready().await?;

        let temp_path = self.temp_path_for(name);
        let file = File::create(&temp_path).await.map_err(|e| {
            StorageError::io(format!("Failed to create {}", temp_path.display()), e)
        })?;

        debug!(temp = %temp_path.display(), "Opened local write");

        Ok(Box::new(LocalSink {
            name: name.to_string(),
            file: Some(file),
            temp_path,
            final_path,
            written: 0,
            finished: false,
        }))
    }

    #[instrument(skip(self))]
    async fn open_read(&self, name: &str) -> StorageResult<ArtifactReader> {
        let path = self.path_for(name)?;
        let file = File::open(&path)
            .await
            .map_err(|e| not_found_or(name, format!("Failed to open {}", path.display()), e))?;
        Ok(Box::pin(file))
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StorageResult<Vec<ArtifactInfo>> {
        let context = || format!("Failed to list {}", self.root.display());

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(context(), e)),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(context(), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // Temp files and anything delete would refuse stay out of listings
            if validate_name(&name).is_err() {
                continue;
            }

            // Entries can vanish between read_dir and metadata under a concurrent delete
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(context(), e)),
            };
            if metadata.is_file() {
                artifacts.push(ArtifactInfo::new(name, metadata.len()));
            }
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(name, format!("Failed to delete {}", path.display()), e))?;

        info!("Deleted local artifact {}", name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_for(name)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(format!("Failed to stat {}", path.display()), e)),
        }
    }
}

struct LocalSink {
    name: String,
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    finished: bool,
}

impl LocalSink {
    fn closed(&self) -> StorageError {
        StorageError::Backend(format!("write to {} already finished", self.name))
    }
}

#[async_trait]
impl ArtifactSink for LocalSink {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let temp_path = &self.temp_path;
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(self.closed()),
        };
        file.write_all(chunk)
            .await
            .map_err(|e| StorageError::io(format!("Failed to write {}", temp_path.display()), e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<u64> {
        let mut sink = self;
        let mut file = sink.file.take().ok_or_else(|| sink.closed())?;

        let context = format!("Failed to flush {}", sink.temp_path.display());
        file.flush()
            .await
            .map_err(|e| StorageError::io(context.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(context, e))?;
        drop(file);

        // On failure the temp file is cleaned up by Drop
        fs::rename(&sink.temp_path, &sink.final_path)
            .await
            .map_err(|e| {
                StorageError::io(format!("Failed to commit {}", sink.final_path.display()), e)
            })?;
        sink.finished = true;

        debug!(name = %sink.name, bytes = sink.written, "Committed local artifact");
        Ok(sink.written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let mut sink = self;
        sink.file.take();
        sink.finished = true;

        match fs::remove_file(&sink.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                format!("Failed to remove {}", sink.temp_path.display()),
                e,
            )),
        }
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.temp_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(temp = %self.temp_path.display(), error = %e, "Failed to remove abandoned write");
            }
        }
    }
}
