//! S3-compatible object store backend
//!
//! Artifacts are objects in one bucket, optionally under a key prefix.
//! Writes are buffered up to one part; anything larger goes through a
//! multipart upload that only becomes visible when it is completed.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration},
    Client,
};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::config::S3Config;
use super::{
    content_type_for, validate_name, ArtifactInfo, ArtifactReader, ArtifactSink, StorageBackend,
    StorageError, StorageResult,
};

/// Upper bound on `head_object` requests in flight while listing
const MAX_CONCURRENT_HEADS: usize = 16;

#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    region: String,
    prefix: Option<String>,
    part_size: usize,
}

impl S3Backend {
    pub fn new(config: &S3Config) -> Self {
        debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "Initializing S3 backend");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "imdb-loader-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Self::with_client(Client::from_conf(s3_config_builder.build()), config)
    }

    fn with_client(client: Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            prefix: config.prefix.clone(),
            part_size: config.part_size_bytes(),
        }
    }

    fn key_for(&self, name: &str) -> StorageResult<String> {
        validate_name(name)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        })
    }

    fn list_prefix(&self) -> Option<String> {
        self.prefix.as_ref().map(|p| format!("{}/", p))
    }

    /// Artifact name for a listed key, or `None` for keys outside the flat namespace
    fn name_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let name = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('/')?,
            None => key,
        };
        validate_name(name).ok().map(|_| name)
    }

    async fn head(&self, name: &str, key: &str) -> StorageResult<Option<String>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(head.content_type().map(str::to_string)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(backend_error(&format!("Failed to inspect {}", key), e)),
        }
    }
}

fn backend_error<E>(context: &str, err: E) -> StorageError
where
    E: std::error::Error + 'static,
{
    StorageError::Backend(format!("{}: {}", context, DisplayErrorContext(err)))
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn location(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("s3://{}/{}", self.bucket, prefix),
            None => format!("s3://{}", self.bucket),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn ensure_ready(&self) -> StorageResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("Created bucket {}", self.bucket);
                Ok(())
            }
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(e) => Err(backend_error(
                &format!("Failed to create bucket {}", self.bucket),
                e,
            )),
        }
    }

    #[instrument(skip(self))]
    async fn open_write(&self, name: &str) -> StorageResult<Box<dyn ArtifactSink>> {
        let key = self.key_for(name)?;
        debug!("Opening write to s3://{}/{}", self.bucket, key);

        Ok(Box::new(S3Sink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key,
            content_type: content_type_for(name),
            part_size: self.part_size,
            buffer: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
            written: 0,
            finished: false,
        }))
    }

    #[instrument(skip(self))]
    async fn open_read(&self, name: &str) -> StorageResult<ArtifactReader> {
        let key = self.key_for(name)?;

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(name.to_string())
                } else {
                    backend_error(&format!("Failed to read {}", key), e)
                }
            })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self) -> StorageResult<Vec<ArtifactInfo>> {
        let mut artifacts = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(self.list_prefix())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend_error(&format!("Failed to list {}", self.location()), e))?;

            for object in response.contents() {
                let Some(name) = object.key().and_then(|k| self.name_from_key(k)) else {
                    continue;
                };
                let mut info = ArtifactInfo::new(name, object.size().unwrap_or(0).max(0) as u64);
                info.last_modified = object.last_modified().and_then(to_chrono);
                artifacts.push(info);
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        // Listings do not carry content types
        let heads: Vec<_> = artifacts
            .iter()
            .map(|artifact| async move {
                let key = self.key_for(&artifact.name)?;
                self.head(&artifact.name, &key).await
            })
            .collect();
        let content_types: Vec<_> = stream::iter(heads)
            .buffered(MAX_CONCURRENT_HEADS)
            .collect()
            .await;

        let mut visible = Vec::with_capacity(artifacts.len());
        for (mut artifact, content_type) in artifacts.into_iter().zip(content_types) {
            match content_type {
                Ok(content_type) => {
                    artifact.content_type = content_type;
                    visible.push(artifact);
                }
                // Deleted since the listing
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(visible)
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> StorageResult<()> {
        let key = self.key_for(name)?;

        // S3 reports success for missing keys
        self.head(name, &key).await?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| backend_error(&format!("Failed to delete {}", key), e))?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let key = self.key_for(name)?;
        match self.head(name, &key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

struct S3Sink {
    client: Client,
    bucket: String,
    key: String,
    content_type: &'static str,
    part_size: usize,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    written: u64,
    finished: bool,
}

impl S3Sink {
    async fn upload_id(&mut self) -> StorageResult<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(self.content_type)
            .send()
            .await
            .map_err(|e| backend_error(&format!("Failed to start upload of {}", self.key), e))?;

        let id = response
            .upload_id()
            .ok_or_else(|| {
                StorageError::Backend(format!("No upload id returned for {}", self.key))
            })?
            .to_string();

        debug!(key = %self.key, upload_id = %id, "Started multipart upload");
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn upload_part(&mut self, data: Vec<u8>) -> StorageResult<()> {
        let upload_id = self.upload_id().await?;
        let part_number = self.parts.len() as i32 + 1;

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                backend_error(
                    &format!("Failed to upload part {} of {}", part_number, self.key),
                    e,
                )
            })?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(response.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for S3Sink {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        if self.finished {
            return Err(StorageError::Backend(format!(
                "write to {} already finished",
                self.key
            )));
        }

        self.buffer.extend_from_slice(chunk);
        self.written += chunk.len() as u64;

        while self.buffer.len() >= self.part_size {
            let rest = self.buffer.split_off(self.part_size);
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<u64> {
        let mut sink = self;

        match sink.upload_id.clone() {
            None => {
                let body = std::mem::take(&mut sink.buffer);
                sink.client
                    .put_object()
                    .bucket(&sink.bucket)
                    .key(&sink.key)
                    .content_type(sink.content_type)
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|e| backend_error(&format!("Failed to upload {}", sink.key), e))?;
            }
            Some(upload_id) => {
                if !sink.buffer.is_empty() {
                    let last = std::mem::take(&mut sink.buffer);
                    sink.upload_part(last).await?;
                }

                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(std::mem::take(&mut sink.parts)))
                    .build();

                sink.client
                    .complete_multipart_upload()
                    .bucket(&sink.bucket)
                    .key(&sink.key)
                    .upload_id(upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| {
                        backend_error(&format!("Failed to complete upload of {}", sink.key), e)
                    })?;
            }
        }

        sink.finished = true;
        info!("Uploaded {} bytes to s3://{}/{}", sink.written, sink.bucket, sink.key);
        Ok(sink.written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let mut sink = self;
        sink.finished = true;

        let Some(upload_id) = sink.upload_id.take() else {
            return Ok(());
        };

        sink.client
            .abort_multipart_upload()
            .bucket(&sink.bucket)
            .key(&sink.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| backend_error(&format!("Failed to abort upload of {}", sink.key), e))?;

        debug!(key = %sink.key, "Aborted multipart upload");
        Ok(())
    }
}

impl Drop for S3Sink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };

        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id);
        let key = self.key.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = request.send().await {
                        warn!(key = %key, error = %DisplayErrorContext(e), "Failed to abort abandoned upload");
                    }
                });
            }
            Err(_) => warn!(key = %key, "No runtime to abort abandoned upload"),
        }
    }
}
