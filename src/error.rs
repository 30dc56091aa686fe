//! Error types
//!
//! `ConfigError` is raised while building a server. `ServeError` never leaves
//! a request: the dispatcher turns it into an [`Outcome`](crate::serve::Outcome).

use hyper::StatusCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("index_files[{index}] is not a string")]
    IndexFileNotString { index: usize },

    #[error("index_files[{index}] is empty")]
    EmptyIndexFile { index: usize },

    #[error("invalid default header '{name}'")]
    InvalidHeader { name: String },

    #[error("cannot resolve server root: {0}")]
    Root(#[source] io::Error),

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("path escapes its containing directory: {}", .0.display())]
    PathViolation(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("neither a file nor a directory: {}", .0.display())]
    UnsupportedType(PathBuf),

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("not modified")]
    NotModified,

    #[error("range not satisfiable")]
    RangeUnsatisfiable,

    #[error("client refuses the {0} encoding")]
    UnsupportedEncoding(&'static str),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("stream failure: {0}")]
    StreamFailure(#[source] io::Error),
}

impl ServeError {
    /// Status code reported for this error
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::PathViolation(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedType(_) => StatusCode::BAD_REQUEST,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::RangeUnsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::UnsupportedEncoding(_) => StatusCode::NOT_ACCEPTABLE,
            Self::MalformedManifest(_) | Self::StreamFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServeError::PathViolation(PathBuf::from("/x")).status(), 403);
        assert_eq!(ServeError::NotFound(PathBuf::from("/x")).status(), 404);
        assert_eq!(ServeError::UnsupportedType(PathBuf::from("/x")).status(), 400);
        assert_eq!(ServeError::PreconditionFailed.status(), 412);
        assert_eq!(ServeError::NotModified.status(), 304);
        assert_eq!(ServeError::RangeUnsatisfiable.status(), 416);
        assert_eq!(ServeError::UnsupportedEncoding("deflate").status(), 406);
        assert_eq!(ServeError::MalformedManifest("x".into()).status(), 500);
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(ServeError::StreamFailure(io_err).status(), 500);
    }

    #[test]
    fn test_messages() {
        let err = ServeError::NotFound(PathBuf::from("/srv/a.txt"));
        assert_eq!(err.to_string(), "not found: /srv/a.txt");
        let err = ConfigError::IndexFileNotString { index: 1 };
        assert_eq!(err.to_string(), "index_files[1] is not a string");
    }
}
