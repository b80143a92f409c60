use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Default directory for the local backend.
pub const DEFAULT_DOWNLOAD_DIR: &str = "imdb_datasets";

/// Default bucket for the object-store backend.
pub const DEFAULT_S3_BUCKET: &str = "imdb-datasets";

/// Default S3 region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Default multipart part size in megabytes.
pub const DEFAULT_S3_PART_SIZE_MB: usize = 8;

/// S3 rejects multipart parts below 5 MiB (except the last one).
pub const MIN_S3_PART_SIZE_MB: usize = 5;

/// Which backend to build, plus the parameters for both
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub use_object_store: bool,
    pub local: LocalConfig,
    pub s3: S3Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Key prefix under which artifacts are stored, without trailing slash
    pub prefix: Option<String>,
    pub part_size_mb: usize,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            use_object_store: env::var("USE_OBJECT_STORE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            local: LocalConfig {
                root: env::var("DOWNLOAD_DIR")
                    .unwrap_or_else(|_| DEFAULT_DOWNLOAD_DIR.to_string())
                    .into(),
            },
            s3: S3Config::from_env()?,
        })
    }

    /// Local backend rooted at `root`
    pub fn local(root: impl AsRef<Path>) -> Self {
        Self {
            use_object_store: false,
            local: LocalConfig {
                root: root.as_ref().to_path_buf(),
            },
            s3: S3Config::for_minio("http://localhost:9000", DEFAULT_S3_BUCKET),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.use_object_store {
            self.s3.validate()
        } else if self.local.root.as_os_str().is_empty() {
            anyhow::bail!("DOWNLOAD_DIR cannot be empty")
        } else {
            Ok(())
        }
    }
}

impl S3Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let part_size_mb = match env::var("S3_PART_SIZE_MB") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid S3_PART_SIZE_MB '{}': {}", raw, e))?,
            Err(_) => DEFAULT_S3_PART_SIZE_MB,
        };

        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| DEFAULT_S3_BUCKET.to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            prefix: env::var("S3_PREFIX")
                .ok()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            part_size_mb,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            prefix: None,
            part_size_mb: DEFAULT_S3_PART_SIZE_MB,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.is_empty() {
            anyhow::bail!("S3_BUCKET cannot be empty");
        }
        if self.part_size_mb < MIN_S3_PART_SIZE_MB {
            anyhow::bail!(
                "S3_PART_SIZE_MB must be at least {} (got {})",
                MIN_S3_PART_SIZE_MB,
                self.part_size_mb
            );
        }
        Ok(())
    }

    pub fn part_size_bytes(&self) -> usize {
        self.part_size_mb * 1024 * 1024
    }
}
