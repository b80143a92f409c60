//! Dataset acquisition and file management routes
//!
//! - `GET /datasets` - the source catalogue
//! - `POST /download` - clear and re-fetch every dataset
//! - `POST /extract` - decompress every stored archive
//! - `GET /files` - list stored artifacts
//! - `DELETE /files` - delete every stored artifact
//! - `POST /full-process` - download, then extract

pub mod routes;
pub mod types;

pub use routes::datasets_routes;
