use anyhow::{bail, Result};
use tracing::warn;

use crate::{RateLimitConfig, RequestConfig, RuntimeConfig, SinkConfig, StorageBackend, StorageConfig};

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_storage_config(&config.storage)?;
    validate_sink_config(&config.sink)?;
    validate_request_config(&config.request)?;
    validate_rate_limit_config(&config.rate_limit)?;

    if config.server.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }
    if !config.server.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires `storage.fs`"))?;
            if fs.path.is_empty() {
                bail!("storage.fs.path must not be empty");
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires `storage.s3`"))?;
            if s3.bucket.is_empty() {
                bail!("storage.s3.bucket is required for the s3 backend");
            }
            if s3.region.is_empty() {
                bail!("storage.s3.region is required for the s3 backend");
            }
            if s3.endpoint.is_empty() {
                bail!("storage.s3.endpoint is required for the s3 backend");
            }
        }
    }
    Ok(())
}

fn validate_sink_config(config: &SinkConfig) -> Result<()> {
    if config.buffer_dir.is_empty() {
        bail!("sink.buffer_dir must not be empty");
    }
    if config.rotation_interval_secs == 0 {
        bail!("sink.rotation_interval_secs must be greater than 0");
    }
    if config.rotation_interval_secs > 3600 {
        warn!(
            rotation_interval_secs = config.rotation_interval_secs,
            "sink.rotation_interval_secs is unusually large; rotated batches will be slow to appear"
        );
    }
    Ok(())
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("request.max_payload_bytes must be greater than 0");
    }
    if config.max_payload_bytes > 100 * 1024 * 1024 {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "request.max_payload_bytes is very large; may cause memory pressure"
        );
    }
    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<()> {
    if config.rate == 0 {
        bail!("rate_limit.rate must be greater than 0");
    }
    if config.burst == 0 {
        bail!("rate_limit.burst must be greater than 0");
    }
    Ok(())
}
