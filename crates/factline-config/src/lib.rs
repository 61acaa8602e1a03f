//! Unified configuration for the `ingest` and `rollup` binaries.
//!
//! Layered precedence, lowest to highest: compiled-in defaults, an optional
//! TOML file, environment variable overrides, CLI flags. Validation runs
//! once, after all sources are merged.

mod sources;
mod validation;

use serde::{Deserialize, Serialize};

pub use sources::load_config;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        validation::validate_config(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data/store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// Durable Sink placement and rotation cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub buffer_dir: String,
    pub rotation_interval_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_dir: "./data/buffer".to_string(),
            rotation_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub max_payload_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Token-bucket rate limiter parameters, shared across every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub rate: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 100,
            burst: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Absent key disables auth entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Rollup-specific overrides. `output_dir` lets the rollup binary write
/// warehouse partitions to a different root than the one it reads raw
/// partitions from; when unset both sides share `storage`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.sink.rotation_interval_secs, 60);
        assert_eq!(config.request.max_payload_bytes, 1024 * 1024);
        assert!(config.server.api_key.is_none());
    }
}
