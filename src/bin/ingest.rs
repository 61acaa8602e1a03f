//! Ingestion process entry point: load configuration, construct the
//! configured object store backend, and serve the HTTP front end until
//! shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use factline_config::{RuntimeConfig, StorageBackend};
use factline_core::Cancellation;
use factline_storage::{ObjectStore, OpenDalStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ingest")]
#[command(version)]
#[command(about = "HTTP ingestion front end for request facts and service events")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file and env).
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Local filesystem root for the object store (filesystem backend only).
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = factline_config::load_config(cli.config.as_deref().and_then(|p| p.to_str()))
        .context("failed to load configuration")?;

    apply_cli_overrides(&mut config, &cli)?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config);

    let store = build_object_store(&config)?;

    factline_ingest::run(config, store).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if let Some(port) = cli.port {
        let host = config
            .server
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.listen_addr = format!("{host}:{port}");
    }

    if let Some(base_dir) = &cli.base_dir {
        config.storage.backend = StorageBackend::Fs;
        config.storage.fs = Some(factline_config::FsConfig {
            path: base_dir.to_string_lossy().to_string(),
        });
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    Ok(())
}

fn build_object_store(config: &RuntimeConfig) -> Result<Arc<dyn ObjectStore>> {
    let cancel = Cancellation::new();
    match config.storage.backend {
        StorageBackend::Fs => {
            let fs = config
                .storage
                .fs
                .as_ref()
                .context("fs backend selected but storage.fs is not configured")?;
            Ok(Arc::new(OpenDalStore::new_fs(&fs.path, cancel)?))
        }
        StorageBackend::S3 => {
            let s3 = config
                .storage
                .s3
                .as_ref()
                .context("s3 backend selected but storage.s3 is not configured")?;
            Ok(Arc::new(OpenDalStore::new_s3(
                &s3.endpoint,
                &s3.region,
                &s3.bucket,
                s3.access_key.as_deref().unwrap_or_default(),
                s3.secret_key.as_deref().unwrap_or_default(),
                cancel,
            )?))
        }
    }
}

fn init_tracing(config: &RuntimeConfig) {
    let env_filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.server.log_format {
        factline_config::LogFormat::Json => registry.with(fmt::layer().json()).init(),
        factline_config::LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}
