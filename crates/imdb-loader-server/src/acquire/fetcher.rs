//! Streams one remote dataset into a storage backend

use futures::StreamExt;
use imdb_loader_common::units::format_file_size;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use super::catalogue::SourceDescriptor;
use super::models::OperationOutcome;
use super::{describe_error, finish_write, FetchError, ItemError};
use crate::config::env_or;
use crate::storage::{ArtifactSink, StorageBackend};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_FETCH_CHUNK_SIZE: usize = 64 * 1024;

const USER_AGENT: &str = concat!("imdb-loader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    /// Maximum idle time between body reads
    pub read_timeout_secs: u64,
    /// Largest chunk handed to the storage sink
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            chunk_size: DEFAULT_FETCH_CHUNK_SIZE,
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            connect_timeout_secs: env_or(
                "FETCH_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            read_timeout_secs: env_or("FETCH_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT_SECS)?,
            chunk_size: env_or("FETCH_CHUNK_SIZE", DEFAULT_FETCH_CHUNK_SIZE)?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("FETCH_CHUNK_SIZE must be greater than zero");
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            anyhow::bail!("Fetch timeouts must be greater than zero");
        }
        Ok(())
    }
}

/// HTTP fetcher shared by all download tasks
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    chunk_size: usize,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Download `source` into `backend` under its logical name
    ///
    /// Never fails; any error is reported in the outcome.
    #[instrument(skip(self, source, backend), fields(name = %source.name))]
    pub async fn fetch(
        &self,
        source: &SourceDescriptor,
        backend: &dyn StorageBackend,
    ) -> OperationOutcome {
        info!("Downloading {} from {}", source.name, source.url);

        match self.try_fetch(source, backend).await {
            Ok(bytes) => {
                info!(size = %format_file_size(bytes), "Downloaded {}", source.name);
                OperationOutcome::success(&source.name)
            }
            Err(e) => {
                let detail = describe_error(&e);
                error!(error = %detail, "Failed to download {}", source.name);
                OperationOutcome::failure(&source.name, detail)
            }
        }
    }

    async fn try_fetch(
        &self,
        source: &SourceDescriptor,
        backend: &dyn StorageBackend,
    ) -> Result<u64, ItemError> {
        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: source.url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: source.url.clone(),
                status,
            }
            .into());
        }
        debug!(content_length = ?response.content_length(), "Response received");

        let mut sink = backend.open_write(&source.name).await?;
        let copied = self.copy_body(response, sink.as_mut(), &source.url).await;
        finish_write(sink, copied).await
    }

    async fn copy_body(
        &self,
        response: reqwest::Response,
        sink: &mut dyn ArtifactSink,
        url: &str,
    ) -> Result<(), ItemError> {
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::Body {
                url: url.to_string(),
                source: e,
            })?;
            for piece in chunk.chunks(self.chunk_size) {
                sink.write(piece).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalBackend;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_stores_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/title.ratings.tsv.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 10_000]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let fetcher = Fetcher::new(&FetchConfig {
            chunk_size: 512,
            ..FetchConfig::default()
        })
        .unwrap();
        let source = SourceDescriptor::new(
            "title.ratings.tsv.gz",
            format!("{}/title.ratings.tsv.gz", server.uri()),
        );

        let outcome = fetcher.fetch(&source, &backend).await;

        assert_eq!(outcome, OperationOutcome::success("title.ratings.tsv.gz"));
        let stored = std::fs::read(dir.path().join("title.ratings.tsv.gz")).unwrap();
        assert_eq!(stored, vec![7u8; 10_000]);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let source = SourceDescriptor::new("title.crew.tsv.gz", format!("{}/missing", server.uri()));

        let outcome = fetcher.fetch(&source, &backend).await;

        assert!(!outcome.succeeded);
        let detail = outcome.error_detail.unwrap();
        assert!(detail.contains("HTTP 404"), "unexpected detail: {}", detail);
        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let source = SourceDescriptor::new("title.akas.tsv.gz", "http://127.0.0.1:1/title.akas.tsv.gz");

        let outcome = fetcher.fetch(&source, &backend).await;

        assert!(!outcome.succeeded);
        assert!(outcome.error_detail.unwrap().starts_with("Request to http://127.0.0.1:1"));
    }

    /// Serves one response that promises more body than it sends, then hangs up
    async fn serve_truncated_body() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&[b'x'; 4096]).await.unwrap();
            socket.flush().await.unwrap();
        });

        format!("http://{}/title.basics.tsv.gz", addr)
    }

    #[tokio::test]
    async fn test_fetch_interrupted_body_leaves_nothing_visible() {
        let url = serve_truncated_body().await;
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let fetcher = Fetcher::new(&FetchConfig {
            chunk_size: 1024,
            ..FetchConfig::default()
        })
        .unwrap();
        let source = SourceDescriptor::new("title.basics.tsv.gz", url.clone());

        let outcome = fetcher.fetch(&source, &backend).await;

        assert!(!outcome.succeeded);
        let detail = outcome.error_detail.unwrap();
        assert!(
            detail.starts_with(&format!("Response body from {} interrupted", url)),
            "unexpected detail: {}",
            detail
        );
        assert!(!backend.exists("title.basics.tsv.gz").await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = FetchConfig {
            chunk_size: 0,
            ..FetchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
