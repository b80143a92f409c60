//! Response bodies for the dataset routes

use serde::{Deserialize, Serialize};

use crate::acquire::{FullProcessReport, PhaseReport, SourceDescriptor};
use crate::registry::DeleteReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<SourceDescriptor>,
    pub total_count: usize,
}

/// One item that failed in a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub filename: String,
    pub error: String,
}

fn failed_items(report: &PhaseReport) -> Vec<FailedItem> {
    report
        .failures()
        .into_iter()
        .map(|(filename, error)| FailedItem { filename, error })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub message: String,
    pub downloaded_files: Vec<String>,
    pub failed_downloads: Vec<FailedItem>,
    pub total_files: usize,
    pub successful_downloads: usize,
}

impl From<PhaseReport> for DownloadResponse {
    fn from(report: PhaseReport) -> Self {
        Self {
            message: "Download completed".to_string(),
            failed_downloads: failed_items(&report),
            total_files: report.total(),
            successful_downloads: report.succeeded.len(),
            downloaded_files: report.succeeded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub message: String,
    pub extracted_files: Vec<String>,
    pub failed_extractions: Vec<FailedItem>,
    pub total_files: usize,
    pub successful_extractions: usize,
}

impl From<PhaseReport> for ExtractResponse {
    fn from(report: PhaseReport) -> Self {
        Self {
            message: "Extraction completed".to_string(),
            failed_extractions: failed_items(&report),
            total_files: report.total(),
            successful_extractions: report.succeeded.len(),
            extracted_files: report.succeeded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted_files: Vec<String>,
    pub total_deleted: usize,
}

impl From<DeleteReport> for DeleteResponse {
    fn from(report: DeleteReport) -> Self {
        Self {
            message: "All files deleted successfully".to_string(),
            deleted_files: report.deleted_files,
            total_deleted: report.total_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullProcessResponse {
    pub message: String,
    pub download: DownloadResponse,
    pub extract: ExtractResponse,
}

impl From<FullProcessReport> for FullProcessResponse {
    fn from(report: FullProcessReport) -> Self {
        Self {
            message: "Full process completed".to_string(),
            download: report.download.into(),
            extract: report.extract.into(),
        }
    }
}
