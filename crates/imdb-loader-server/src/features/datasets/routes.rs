use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use super::types::{
    DatasetsResponse, DeleteResponse, DownloadResponse, ExtractResponse, FullProcessResponse,
};
use crate::error::AppError;
use crate::features::FeatureState;
use crate::registry::{self, FileListing};

pub fn datasets_routes() -> Router<FeatureState> {
    Router::new()
        .route("/datasets", get(list_datasets))
        .route("/download", post(download_datasets))
        .route("/extract", post(extract_datasets))
        .route("/files", get(list_files).delete(delete_files))
        .route("/full-process", post(full_process))
}

async fn list_datasets(State(state): State<FeatureState>) -> Json<DatasetsResponse> {
    let datasets = state.orchestrator.list_sources().to_vec();
    Json(DatasetsResponse {
        total_count: datasets.len(),
        datasets,
    })
}

#[tracing::instrument(skip(state))]
async fn download_datasets(
    State(state): State<FeatureState>,
) -> Result<Json<DownloadResponse>, AppError> {
    let report = state.orchestrator.download_all(&state.backend).await?;
    Ok(Json(report.into()))
}

#[tracing::instrument(skip(state))]
async fn extract_datasets(
    State(state): State<FeatureState>,
) -> Result<Json<ExtractResponse>, AppError> {
    let report = state.orchestrator.extract_all(&state.backend).await?;
    Ok(Json(report.into()))
}

async fn list_files(State(state): State<FeatureState>) -> Result<Json<FileListing>, AppError> {
    Ok(Json(registry::list_files(state.backend.as_ref()).await?))
}

#[tracing::instrument(skip(state))]
async fn delete_files(State(state): State<FeatureState>) -> Result<Json<DeleteResponse>, AppError> {
    let report = registry::delete_all(state.backend.as_ref()).await?;
    Ok(Json(report.into()))
}

#[tracing::instrument(skip(state))]
async fn full_process(
    State(state): State<FeatureState>,
) -> Result<Json<FullProcessResponse>, AppError> {
    let report = state.orchestrator.full_process(&state.backend).await?;
    Ok(Json(report.into()))
}
