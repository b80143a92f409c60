//! IMDb Loader Server - Main entry point

use anyhow::Result;
use imdb_loader_common::logging::{init_logging, LogConfig};
use tracing::info;

use imdb_loader_server::{api, config::Config, storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults for this binary; LOG_* environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("imdb-loader-server")
        .filter_directives(
            "imdb_loader_server=debug,tower_http=debug,hyper=warn,reqwest=warn,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_s3=warn",
        )
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting IMDb loader server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let backend = storage::init(&config.storage).await?;

    api::serve(config, backend).await
}
