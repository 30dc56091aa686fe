// Configuration types module
// Defines the sections of the application configuration file

use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ListenConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub serve: ServeConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Minimum level: error, warn, info or debug
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Connection handling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Upper bound in seconds for one connection, including the transfer
    pub connection_timeout: u64,
    pub max_connections: Option<u64>,
}

/// What to serve and how
#[derive(Debug, Deserialize, Clone)]
pub struct ServeConfig {
    pub root: String,
    /// Raw values, validated when the server is built
    pub index_files: Vec<serde_json::Value>,
    pub accept_ranges: bool,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Query parameter carrying the archive download name
    pub download_param: String,
    /// Directory for archives under construction
    #[serde(default)]
    pub temp_dir: Option<String>,
}
