//! Acquisition orchestrator
//!
//! Runs the fetch and extract phases over every item concurrently. Each item
//! is its own spawned task; the phase waits for all of them and never stops
//! early. A dropped request does not cancel tasks already started, and since
//! artifacts are only committed on success nothing partial is left behind.

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn, Instrument};

use super::catalogue::{Catalogue, SourceDescriptor};
use super::decompression::{decompressed_name, Decompressor, COMPRESSED_SUFFIX};
use super::fetcher::Fetcher;
use super::models::{FullProcessReport, OperationOutcome, Phase, PhaseReport};
use super::AcquireResult;
use crate::storage::{SharedBackend, StorageError};

pub struct AcquisitionOrchestrator {
    catalogue: Catalogue,
    fetcher: Fetcher,
    decompressor: Decompressor,
}

impl AcquisitionOrchestrator {
    pub fn new(catalogue: Catalogue, fetcher: Fetcher, decompressor: Decompressor) -> Self {
        Self {
            catalogue,
            fetcher,
            decompressor,
        }
    }

    pub fn list_sources(&self) -> &[SourceDescriptor] {
        self.catalogue.sources()
    }

    /// Clear and re-fetch every catalogue item
    #[instrument(skip_all, fields(location = %backend.location()))]
    pub async fn download_all(&self, backend: &SharedBackend) -> AcquireResult<PhaseReport> {
        backend.ensure_ready().await?;
        self.clear_catalogue_artifacts(backend).await?;

        info!("Starting download of {} datasets", self.catalogue.len());

        let handles = self
            .catalogue
            .sources()
            .iter()
            .cloned()
            .map(|source| {
                let fetcher = self.fetcher.clone();
                let backend = Arc::clone(backend);
                tokio::spawn(
                    async move { fetcher.fetch(&source, backend.as_ref()).await }
                        .in_current_span(),
                )
            })
            .collect();

        let names = self.catalogue.names().map(str::to_string).collect();
        let report = PhaseReport::from_outcomes(Phase::Download, join_outcomes(names, handles).await);
        log_summary(&report);
        report.into_result()
    }

    /// Decompress every stored `.gz` artifact
    #[instrument(skip_all, fields(location = %backend.location()))]
    pub async fn extract_all(&self, backend: &SharedBackend) -> AcquireResult<PhaseReport> {
        let mut names: Vec<String> = backend
            .list()
            .await?
            .into_iter()
            .map(|artifact| artifact.name)
            .filter(|name| name.ends_with(COMPRESSED_SUFFIX) && decompressed_name(name).is_some())
            .collect();
        names.sort();

        info!("Starting extraction of {} archives", names.len());

        let handles = names
            .iter()
            .cloned()
            .map(|name| {
                let decompressor = self.decompressor.clone();
                let backend = Arc::clone(backend);
                tokio::spawn(
                    async move { decompressor.extract(&name, backend.as_ref()).await }
                        .in_current_span(),
                )
            })
            .collect();

        let report = PhaseReport::from_outcomes(Phase::Extract, join_outcomes(names, handles).await);
        log_summary(&report);
        report.into_result()
    }

    /// Download, then extract if anything was downloaded
    pub async fn full_process(&self, backend: &SharedBackend) -> AcquireResult<FullProcessReport> {
        let download = self.download_all(backend).await?;
        let extract = self.extract_all(backend).await?;
        Ok(FullProcessReport { download, extract })
    }

    /// Delete-before-refetch, limited to catalogue names
    async fn clear_catalogue_artifacts(&self, backend: &SharedBackend) -> AcquireResult<()> {
        for name in self.catalogue.names() {
            match backend.delete(name).await {
                Ok(()) => info!("Removed existing {}", name),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Join all tasks, keeping each outcome in its item's slot
async fn join_outcomes(
    names: Vec<String>,
    handles: Vec<JoinHandle<OperationOutcome>>,
) -> Vec<OperationOutcome> {
    join_all(handles)
        .await
        .into_iter()
        .zip(names)
        .map(|(joined, name)| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(name = %name, error = %e, "Item task did not complete");
                OperationOutcome::failure(name, format!("Task failed: {}", e))
            }
        })
        .collect()
}

fn log_summary(report: &PhaseReport) {
    if report.failed.is_empty() {
        info!(
            "{} complete: {}/{} succeeded",
            report.phase,
            report.succeeded.len(),
            report.total()
        );
    } else {
        warn!(
            failed = ?report.failed.keys().collect::<Vec<_>>(),
            "{} complete: {}/{} succeeded",
            report.phase,
            report.succeeded.len(),
            report.total()
        );
    }
}
