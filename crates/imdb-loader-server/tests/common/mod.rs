//! Common test utilities for IMDb loader integration tests
//!
//! - [`MemoryBackend`]: an in-process object store implementing `StorageBackend`
//!   that records the largest chunk it was handed
//! - wiremock helpers serving a fake dataset host
//! - deterministic TSV payloads and gzip helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use imdb_loader_server::acquire::{
    AcquisitionOrchestrator, Catalogue, Decompressor, ExtractConfig, FetchConfig, Fetcher,
    SourceDescriptor,
};
use imdb_loader_server::storage::{
    content_type_for, ArtifactInfo, ArtifactReader, ArtifactSink, StorageBackend, StorageError,
    StorageResult,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Chunk size used by pipeline tests; payloads are many times larger
pub const TEST_CHUNK_SIZE: usize = 1024;

/// The IMDb catalogue names in order
pub const DATASET_NAMES: [&str; 7] = imdb_loader_server::acquire::catalogue::IMDB_DATASETS;

// ============================================================================
// In-memory object store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    content_type: String,
}

type Objects = Arc<Mutex<BTreeMap<String, StoredObject>>>;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Objects,
    largest_write: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, name: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(
            name.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
                content_type: content_type_for(name).to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(name).map(|o| o.data.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Largest single chunk any sink received
    pub fn largest_write(&self) -> usize {
        self.largest_write.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn location(&self) -> String {
        "memory://datasets".to_string()
    }

    async fn ensure_ready(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn open_write(&self, name: &str) -> StorageResult<Box<dyn ArtifactSink>> {
        Ok(Box::new(MemorySink {
            name: name.to_string(),
            buffer: Vec::new(),
            objects: Arc::clone(&self.objects),
            largest_write: Arc::clone(&self.largest_write),
        }))
    }

    async fn open_read(&self, name: &str) -> StorageResult<ArtifactReader> {
        let data = self
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(Box::pin(std::io::Cursor::new(data)))
    }

    async fn list(&self) -> StorageResult<Vec<ArtifactInfo>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, object)| ArtifactInfo {
                name: name.clone(),
                size_bytes: object.data.len() as u64,
                last_modified: Some(object.last_modified),
                content_type: Some(object.content_type.clone()),
            })
            .collect())
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(name))
    }
}

struct MemorySink {
    name: String,
    buffer: Vec<u8>,
    objects: Objects,
    largest_write: Arc<AtomicUsize>,
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.largest_write.fetch_max(chunk.len(), Ordering::SeqCst);
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<u64> {
        let size = self.buffer.len() as u64;
        self.objects.lock().unwrap().insert(
            self.name.clone(),
            StoredObject {
                content_type: content_type_for(&self.name).to_string(),
                data: self.buffer,
                last_modified: Utc::now(),
            },
        );
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

/// A backend whose bootstrap always fails
pub struct UnreachableBackend;

#[async_trait]
impl StorageBackend for UnreachableBackend {
    fn location(&self) -> String {
        "s3://unreachable".to_string()
    }

    async fn ensure_ready(&self) -> StorageResult<()> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn open_write(&self, _name: &str) -> StorageResult<Box<dyn ArtifactSink>> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn open_read(&self, _name: &str) -> StorageResult<ArtifactReader> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn list(&self) -> StorageResult<Vec<ArtifactInfo>> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn delete(&self, _name: &str) -> StorageResult<()> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn exists(&self, _name: &str) -> StorageResult<bool> {
        Err(StorageError::Backend("connection refused".to_string()))
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Deterministic TSV-looking bytes, different per seed
pub fn tsv_payload(seed: u64, rows: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut out = b"tconst\ttitleType\tprimaryTitle\tstartYear\n".to_vec();
    for row in 0..rows {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(
            format!(
                "tt{:07}\tmovie\tTitle {:x}\t{}\n",
                row,
                state,
                1900 + state % 125
            )
            .as_bytes(),
        );
    }
    out
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Uncompressed and compressed payload for every dataset, in catalogue order
pub fn dataset_payloads(rows: usize) -> Vec<(String, Vec<u8>, Vec<u8>)> {
    DATASET_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let raw = tsv_payload(i as u64 + 1, rows);
            let compressed = gzip(&raw);
            (name.to_string(), raw, compressed)
        })
        .collect()
}

// ============================================================================
// Fake dataset host
// ============================================================================

/// Serve each `(name, body)` at `/<name>`
pub async fn serve_datasets(server: &MockServer, payloads: &[(String, Vec<u8>, Vec<u8>)]) {
    for (name, _, compressed) in payloads {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed.clone()))
            .mount(server)
            .await;
    }
}

/// Respond to every request with `status`
pub async fn fail_all(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub fn catalogue_for(server: &MockServer) -> Catalogue {
    Catalogue::imdb(&server.uri()).unwrap()
}

/// Catalogue whose item at `index` points at a port nothing listens on
pub fn catalogue_with_unreachable(server: &MockServer, index: usize) -> Catalogue {
    let sources = DATASET_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let url = if i == index {
                format!("http://127.0.0.1:1/{}", name)
            } else {
                format!("{}/{}", server.uri(), name)
            };
            SourceDescriptor::new(*name, url)
        })
        .collect();
    Catalogue::new(sources).unwrap()
}

pub fn orchestrator(catalogue: Catalogue) -> AcquisitionOrchestrator {
    let fetcher = Fetcher::new(&FetchConfig {
        chunk_size: TEST_CHUNK_SIZE,
        ..FetchConfig::default()
    })
    .unwrap();
    let decompressor = Decompressor::new(&ExtractConfig {
        chunk_size: TEST_CHUNK_SIZE,
    });
    AcquisitionOrchestrator::new(catalogue, fetcher, decompressor)
}
