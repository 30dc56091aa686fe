// Static-serving configuration
// Built once per server and never mutated afterwards

use hyper::header::{HeaderName, HeaderValue};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::http::HeaderSet;
use crate::serve::path_guard::absolute_root;

/// Value of the `Server` header unless the defaults supply one
pub const SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Tunables accepted by [`ServerConfig::new`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Tried in order when a directory is requested
    pub index_files: Vec<String>,
    /// Sent with every response; per-call headers win on conflict
    pub default_headers: HeaderSet,
    pub accept_ranges: bool,
    /// Where archives are built; the system temporary directory if unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            index_files: vec!["index.html".to_string()],
            default_headers: HeaderSet::new(),
            accept_ranges: true,
            temp_dir: None,
        }
    }
}

/// Immutable configuration of one [`Server`](crate::serve::Server)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    root: PathBuf,
    index_files: Vec<String>,
    default_headers: HeaderSet,
    accept_ranges: bool,
    temp_dir: PathBuf,
}

impl ServerConfig {
    /// Validate `options` and fix the absolute root
    pub fn new(root: impl AsRef<Path>, options: ServerOptions) -> Result<Self, ConfigError> {
        let root = absolute_root(root.as_ref()).map_err(ConfigError::Root)?;

        if let Some(index) = options.index_files.iter().position(|name| name.trim().is_empty()) {
            return Err(ConfigError::EmptyIndexFile { index });
        }

        let mut default_headers = options.default_headers;
        for (name, value) in default_headers.iter() {
            let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
                && HeaderValue::from_str(value).is_ok();
            if !valid {
                return Err(ConfigError::InvalidHeader {
                    name: name.to_string(),
                });
            }
        }
        default_headers.insert_if_absent("Server", SERVER_NAME);
        if options.accept_ranges {
            default_headers.insert("Accept-Ranges", "bytes");
        }

        let temp_dir = match options.temp_dir {
            Some(dir) => absolute_root(&dir).map_err(ConfigError::Root)?,
            None => std::env::temp_dir(),
        };

        Ok(Self {
            root,
            index_files: options.index_files,
            default_headers,
            accept_ranges: options.accept_ranges,
            temp_dir,
        })
    }

    /// Serve the working directory with default options
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(".", ServerOptions::default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_files(&self) -> &[String] {
        &self.index_files
    }

    pub const fn default_headers(&self) -> &HeaderSet {
        &self.default_headers
    }

    pub const fn accept_ranges(&self) -> bool {
        self.accept_ranges
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

/// Turn raw configuration values into index file names.
///
/// Every entry must be a non-empty string.
pub fn index_files_from_values(values: &[serde_json::Value]) -> Result<Vec<String>, ConfigError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| match value.as_str() {
            Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
            Some(_) => Err(ConfigError::EmptyIndexFile { index }),
            None => Err(ConfigError::IndexFileNotString { index }),
        })
        .collect()
}
