// Configuration module entry point
// Loads the application configuration and builds the serving configuration from it

mod server;
mod types;

use std::net::SocketAddr;
use std::path::PathBuf;

pub use server::{index_files_from_values, ServerConfig, ServerOptions, SERVER_NAME};
pub use types::{Config, ListenConfig, LoggingConfig, PerformanceConfig, ServeConfig};

use crate::error::ConfigError;
use crate::http::HeaderSet;

/// Prefix of environment overrides, e.g. `ZIPSERVE_SERVER__PORT=9000`
const ENV_PREFIX: &str = "ZIPSERVE";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// A missing file is fine: defaults and environment variables still apply.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 300)?
            .set_default("serve.root", ".")?
            .set_default("serve.index_files", vec!["index.html"])?
            .set_default("serve.accept_ranges", true)?
            .set_default("serve.download_param", "download")?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Validate the `serve` section into a [`ServerConfig`]
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let options = ServerOptions {
            index_files: index_files_from_values(&self.serve.index_files)?,
            default_headers: self
                .serve
                .default_headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect::<HeaderSet>(),
            accept_ranges: self.serve.accept_ranges,
            temp_dir: self.serve.temp_dir.as_ref().map(PathBuf::from),
        };
        ServerConfig::new(&self.serve.root, options)
    }
}
