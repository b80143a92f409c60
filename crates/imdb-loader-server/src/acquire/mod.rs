//! Dataset acquisition pipeline
//!
//! Fetches the catalogue of remote compressed datasets into the active
//! storage backend and decompresses them in a second pass.
//!
//! # Architecture
//!
//! - **catalogue**: the fixed set of remote sources
//! - **fetcher**: streams one remote source into a backend
//! - **decompression**: streams one stored `.gz` artifact into its decompressed sibling
//! - **orchestrator**: runs either phase over all items concurrently and folds the outcomes
//! - **models**: outcomes and phase reports
//!
//! Per-item failures never escape an item's task; they become failed
//! [`models::OperationOutcome`]s. Only [`AcquireError`] crosses the
//! orchestrator boundary.

use std::error::Error as StdError;
use thiserror::Error;
use tracing::warn;

use crate::storage::{ArtifactSink, StorageError};

pub mod catalogue;
pub mod decompression;
pub mod fetcher;
pub mod models;
pub mod orchestrator;

pub use catalogue::{Catalogue, CatalogueError, SourceDescriptor};
pub use decompression::{decompressed_name, Decompressor, ExtractConfig, COMPRESSED_SUFFIX};
pub use fetcher::{FetchConfig, Fetcher};
pub use models::{FullProcessReport, OperationOutcome, Phase, PhaseReport};
pub use orchestrator::AcquisitionOrchestrator;

/// Transport-level failure of one fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Response body from {url} interrupted")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Why a single catalogue item failed in either phase
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Compressed artifact {0} does not exist")]
    MissingArtifact(String),

    #[error("Corrupt or truncated archive {name}")]
    CorruptArchive {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Hard failures of a whole phase
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("All {attempted} {phase} operations failed")]
    AllItemsFailed {
        phase: Phase,
        attempted: usize,
        /// item name -> error detail
        failures: Vec<(String, String)>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type AcquireResult<T> = std::result::Result<T, AcquireError>;

/// Render an error together with its chain of causes
pub fn describe_error(err: &(dyn StdError + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // thiserror's `{context}: {source}` formats already embed the cause
        if !detail.ends_with(&cause_text) {
            detail.push_str(": ");
            detail.push_str(&cause_text);
        }
        source = cause.source();
    }
    detail
}

/// Commit the sink if the copy succeeded, otherwise abort it
///
/// The copy error wins over a failure to abort.
pub(crate) async fn finish_write(
    sink: Box<dyn ArtifactSink>,
    copied: Result<(), ItemError>,
) -> Result<u64, ItemError> {
    match copied {
        Ok(()) => Ok(sink.commit().await?),
        Err(e) => {
            if let Err(abort_err) = sink.abort().await {
                warn!(error = %abort_err, "Failed to discard partial artifact");
            }
            Err(e)
        }
    }
}
