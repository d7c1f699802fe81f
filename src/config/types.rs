// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// On-disk layout of the data directories
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root that the relative directories below are resolved against
    pub base_dir: PathBuf,
    /// Holds the shared dataset (`combined.csv`)
    pub dataset_dir: PathBuf,
    /// Holds user snapshots and generated exports
    pub user_dir: PathBuf,
    /// Created at startup and reported by the health check
    pub temp_image_dir: PathBuf,
}

impl StorageConfig {
    pub fn dataset_path(&self) -> PathBuf {
        self.base_dir.join(&self.dataset_dir)
    }

    pub fn user_path(&self) -> PathBuf {
        self.base_dir.join(&self.user_dir)
    }

    pub fn temp_image_path(&self) -> PathBuf {
        self.base_dir.join(&self.temp_image_dir)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Log file path (optional, stdout if not set)
    #[serde(default)]
    pub log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}
