//! HTTP static file server with conditional requests, byte ranges and
//! on-demand zip archives of directories.
//!
//! ```no_run
//! use zipserve::config::{ServerConfig, ServerOptions};
//! use zipserve::serve::{Events, PipeRequest, Server};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::new(ServerConfig::new("/srv/www", ServerOptions::default())?);
//! let reply = server
//!     .pipe(PipeRequest::new("/index.html", hyper::HeaderMap::new()), &Events::new())
//!     .await;
//! assert!(!reply.is_deferred());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod serve;
pub mod server;

pub use error::{ConfigError, ServeError};
