use std::env;
use std::path::Path;

use anyhow::{Context, Result};

use crate::{FsConfig, LogFormat, RuntimeConfig, S3Config, StorageBackend};

const ENV_PREFIX: &str = "FACTLINE_";

/// Loads configuration from all sources, lowest to highest precedence:
/// compiled defaults, an optional TOML file, then environment overrides.
/// CLI flags are applied by the caller afterwards (they need `clap`'s parsed
/// args, which this crate deliberately does not depend on) and validation
/// must be re-run by the caller once those are merged in.
pub fn load_config(config_path: Option<&str>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file(config_path)? {
        config = file_config;
    }

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file(explicit_path: Option<&str>) -> Result<Option<RuntimeConfig>> {
    let path = match explicit_path {
        Some(p) => Some(p.to_string()),
        None if Path::new("./config.toml").exists() => Some("./config.toml".to_string()),
        None => None,
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {path}"))?;
    let config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {path}"))?;
    Ok(Some(config))
}

/// Applies overrides field-by-field so a partial environment never wipes
/// out an otherwise-valid file-provided config.
fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    // S3_ENDPOINT presence selects the S3-compatible backend.
    if let Some(endpoint) = get_env("S3_ENDPOINT")? {
        let mut s3 = config.storage.s3.take().unwrap_or(S3Config {
            endpoint: endpoint.clone(),
            region: String::new(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
        });
        s3.endpoint = endpoint;
        if let Some(region) = get_env("S3_REGION")? {
            s3.region = region;
        }
        if let Some(bucket) = get_env("S3_BUCKET")? {
            s3.bucket = bucket;
        }
        if let Some(access_key) = get_env("S3_ACCESS_KEY")? {
            s3.access_key = Some(access_key);
        }
        if let Some(secret_key) = get_env("S3_SECRET_KEY")? {
            s3.secret_key = Some(secret_key);
        }
        config.storage.s3 = Some(s3);
        config.storage.backend = StorageBackend::S3;
    }

    if let Some(api_key) = get_env("API_KEY")? {
        config.server.api_key = Some(api_key);
    }

    if let Some(level) = get_env("LOG_LEVEL")? {
        config.server.log_level = level;
    }

    if let Some(format) = get_env("LOG_FORMAT")? {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    if let Some(addr) = get_env("LISTEN_ADDR")? {
        config.server.listen_addr = addr;
    }

    if let Some(dir) = get_env("BUFFER_DIR")? {
        config.sink.buffer_dir = dir;
    }

    Ok(())
}

fn get_env(key: &str) -> Result<Option<String>> {
    let full_key = format!("{ENV_PREFIX}{key}");
    // A couple of env vars (API_KEY, S3_*) are documented without the
    // FACTLINE_ prefix in the process surface; check both forms.
    match env::var(&full_key) {
        Ok(val) if !val.is_empty() => return Ok(Some(val)),
        Ok(_) => return Ok(None),
        Err(env::VarError::NotPresent) => {}
        Err(e) => return Err(e).with_context(|| format!("failed to read env var {full_key}")),
    }
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read env var {key}")),
    }
}
