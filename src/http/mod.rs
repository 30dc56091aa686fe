//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from the
//! dispatcher: dates, headers, MIME types, conditional requests, ranges and
//! encoding negotiation.

pub mod date;
pub mod encoding;
pub mod headers;
pub mod mime;
pub mod precondition;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use headers::HeaderSet;
pub use precondition::PreconditionVerdict;
pub use range::{parse_range, ByteRange, RangeResolution};
pub use response::{build_405_response, build_options_response, ServeBody};
