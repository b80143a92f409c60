//! Streaming gzip extraction between two stored artifacts
//!
//! The compressed artifact is read `chunk_size` bytes at a time and pushed
//! through a `flate2` write-side decoder one `write` call at a time. Each
//! call inflates at most one internal buffer of output, which is drained
//! into the destination sink before the next call, so memory stays flat no
//! matter how well the input compresses. Only a single gzip member is
//! accepted, which is what the IMDb exports are.

use flate2::write::GzDecoder;
use imdb_loader_common::units::format_file_size;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tokio::io::AsyncReadExt;
use tracing::{error, info, instrument};

use super::models::OperationOutcome;
use super::{describe_error, finish_write, ItemError};
use crate::config::env_or;
use crate::storage::{ArtifactReader, ArtifactSink, StorageBackend, StorageError};

/// Suffix marking a compressed artifact
pub const COMPRESSED_SUFFIX: &str = ".gz";

pub const DEFAULT_EXTRACT_CHUNK_SIZE: usize = 64 * 1024;

/// Name of the decompressed artifact, or `None` if `name` is not compressed
pub fn decompressed_name(name: &str) -> Option<&str> {
    name.strip_suffix(COMPRESSED_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub chunk_size: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_EXTRACT_CHUNK_SIZE,
        }
    }
}

impl ExtractConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            chunk_size: env_or("EXTRACT_CHUNK_SIZE", DEFAULT_EXTRACT_CHUNK_SIZE)?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("EXTRACT_CHUNK_SIZE must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Decompressor {
    chunk_size: usize,
}

impl Decompressor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Decompress `compressed_name` into its derived name
    ///
    /// Never fails; any error is reported in the outcome.
    #[instrument(skip(self, backend))]
    pub async fn extract(&self, compressed_name: &str, backend: &dyn StorageBackend) -> OperationOutcome {
        match self.try_extract(compressed_name, backend).await {
            Ok((target, bytes)) => {
                info!(size = %format_file_size(bytes), "Extracted {} to {}", compressed_name, target);
                OperationOutcome::success(compressed_name)
            }
            Err(e) => {
                let detail = describe_error(&e);
                error!(error = %detail, "Failed to extract {}", compressed_name);
                OperationOutcome::failure(compressed_name, detail)
            }
        }
    }

    async fn try_extract<'a>(
        &self,
        compressed_name: &'a str,
        backend: &dyn StorageBackend,
    ) -> Result<(&'a str, u64), ItemError> {
        let target = decompressed_name(compressed_name)
            .ok_or_else(|| StorageError::InvalidName(compressed_name.to_string()))?;

        if !backend.exists(compressed_name).await? {
            return Err(ItemError::MissingArtifact(compressed_name.to_string()));
        }
        let reader = backend.open_read(compressed_name).await.map_err(|e| match e {
            StorageError::NotFound(name) => ItemError::MissingArtifact(name),
            other => other.into(),
        })?;

        let mut sink = backend.open_write(target).await?;
        let copied = self.inflate(reader, sink.as_mut(), compressed_name).await;
        let bytes = finish_write(sink, copied).await?;
        Ok((target, bytes))
    }

    async fn inflate(
        &self,
        mut reader: ArtifactReader,
        sink: &mut dyn ArtifactSink,
        name: &str,
    ) -> Result<(), ItemError> {
        let corrupt = |source: std::io::Error| ItemError::CorruptArchive {
            name: name.to_string(),
            source,
        };

        let mut decoder = GzDecoder::new(Vec::with_capacity(self.chunk_size));
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::io(format!("Failed to read {}", name), e))?;
            if n == 0 {
                break;
            }
            let mut input = &buf[..n];
            while !input.is_empty() {
                let consumed = inflate_step(&mut decoder, input).map_err(corrupt)?;
                input = &input[consumed..];
                self.drain(&mut decoder, sink).await?;
            }
        }

        // Fails on a truncated stream or a checksum mismatch
        decoder.try_finish().map_err(corrupt)?;
        self.drain(&mut decoder, sink).await
    }

    async fn drain(
        &self,
        decoder: &mut GzDecoder<Vec<u8>>,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), ItemError> {
        let inflated = std::mem::take(decoder.get_mut());
        for piece in inflated.chunks(self.chunk_size) {
            sink.write(piece).await?;
        }
        Ok(())
    }
}

/// Feed the decoder once; the caller drains its output before calling again
fn inflate_step(decoder: &mut GzDecoder<Vec<u8>>, input: &[u8]) -> io::Result<usize> {
    match decoder.write(input)? {
        // The member and its trailer are complete but input remains
        0 => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected data after gzip member",
        )),
        consumed => Ok(consumed),
    }
}
