//! Rollup process entry point: scans one day (or an inclusive day range, for
//! backfill) of raw partitions and publishes both warehouse aggregates
//! (request metrics and service events) for each day.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use factline_config::{RuntimeConfig, StorageBackend};
use factline_core::Cancellation;
use factline_rollup::{day_range, run, RollupKind};
use factline_storage::{ObjectStore, OpenDalStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rollup")]
#[command(version)]
#[command(about = "Batch rollup of raw JSONL partitions into Parquet warehouse partitions")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Local filesystem root to read raw partitions from (filesystem backend only).
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Local filesystem root to write warehouse partitions to, if different from input-dir.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Single day to process, as an RFC 3339 timestamp; defaults to "now".
    #[arg(long, value_name = "RFC3339")]
    process_time: Option<String>,

    /// Inclusive backfill range start, YYYY-MM-DD. Requires --end-day.
    #[arg(long, value_name = "YYYY-MM-DD")]
    start_day: Option<String>,

    /// Inclusive backfill range end, YYYY-MM-DD. Requires --start-day.
    #[arg(long, value_name = "YYYY-MM-DD")]
    end_day: Option<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<ExitCode> {
    let mut config = factline_config::load_config(cli.config.as_deref().and_then(|p| p.to_str()))
        .context("failed to load configuration")?;

    if let Some(input_dir) = &cli.input_dir {
        config.storage.backend = StorageBackend::Fs;
        config.storage.fs = Some(factline_config::FsConfig {
            path: input_dir.to_string_lossy().to_string(),
        });
    }
    if let Some(output_dir) = &cli.output_dir {
        config.rollup.output_dir = Some(output_dir.to_string_lossy().to_string());
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config);

    let days = resolve_days(&cli)?;
    let store = build_object_store(&config)?;
    let lock_dir = resolve_lock_dir(&config)?;

    let mut failed = false;
    for kind in [RollupKind::Metrics, RollupKind::Events] {
        match run(kind, Arc::clone(&store), &lock_dir, &days).await {
            Ok(reports) => {
                for report in &reports {
                    tracing::info!(
                        kind = ?kind,
                        day = %report.day,
                        rows_written = report.rows_written,
                        "rollup day succeeded"
                    );
                }
            }
            Err(e) => {
                tracing::error!(kind = ?kind, error = %e, "rollup run failed");
                failed = true;
            }
        }
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn resolve_days(cli: &Cli) -> Result<Vec<NaiveDate>> {
    match (&cli.start_day, &cli.end_day) {
        (Some(start), Some(end)) => {
            let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
                .with_context(|| format!("invalid --start-day: {start}"))?;
            let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
                .with_context(|| format!("invalid --end-day: {end}"))?;
            anyhow::ensure!(start <= end, "--start-day must not be after --end-day");
            Ok(day_range(start, end))
        }
        (None, None) => {
            let day = match &cli.process_time {
                Some(ts) => chrono::DateTime::parse_from_rfc3339(ts)
                    .with_context(|| format!("invalid --process-time: {ts}"))?
                    .with_timezone(&Utc)
                    .date_naive(),
                None => Utc::now().date_naive(),
            };
            Ok(vec![day])
        }
        _ => anyhow::bail!("--start-day and --end-day must be given together"),
    }
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

/// The rollup lock is a single-host filesystem artifact even when the
/// warehouse itself lives in S3, since liveness is only checkable against a
/// PID on this host. Defaults to `rollup.output_dir`, then the fs backend
/// root, then a local `./data/rollup-lock` fallback for an S3-only setup.
fn resolve_lock_dir(config: &RuntimeConfig) -> Result<PathBuf> {
    if let Some(output_dir) = &config.rollup.output_dir {
        return Ok(PathBuf::from(output_dir));
    }
    if let Some(fs) = &config.storage.fs {
        return Ok(PathBuf::from(&fs.path));
    }
    Ok(PathBuf::from("./data/rollup-lock"))
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
