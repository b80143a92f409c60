//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::acquire::{describe_error, AcquireError};
use crate::api::response::ErrorResponse;
use crate::storage::StorageError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn storage_parts(err: &StorageError) -> (StatusCode, &'static str, String) {
    match err {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        StorageError::InvalidName(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string()),
        _ => {
            tracing::error!(error = %describe_error(err), "Storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                describe_error(err),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_response = match &self {
            AppError::Acquire(AcquireError::AllItemsFailed { failures, .. }) => {
                tracing::error!("{}", self);
                let details: Vec<_> = failures
                    .iter()
                    .map(|(filename, error)| json!({ "filename": filename, "error": error }))
                    .collect();
                let body =
                    ErrorResponse::with_details("ALL_ITEMS_FAILED", self.to_string(), json!(details));
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
            AppError::Acquire(AcquireError::Storage(err)) | AppError::Storage(err) => {
                storage_parts(err)
            }
        };

        let (status, code, message) = error_response;
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
