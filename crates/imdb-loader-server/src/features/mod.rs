//! Feature modules implementing the loader API
//!
//! - **datasets**: catalogue, download, extraction and file management

pub mod datasets;

use axum::Router;
use std::sync::Arc;

use crate::acquire::AcquisitionOrchestrator;
use crate::storage::SharedBackend;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub orchestrator: Arc<AcquisitionOrchestrator>,
    /// The one backend selected at startup
    pub backend: SharedBackend,
}

/// Creates the API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .merge(datasets::datasets_routes())
        .with_state(state)
}
