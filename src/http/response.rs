//! HTTP response building module
//!
//! Provides builders for status-only and streamed responses, decoupled from
//! the dispatcher's business logic.

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::io;

use super::headers::HeaderSet;

/// Body type of every response the server produces.
///
/// Streamed bodies fail with `io::Error`, which makes hyper abort the
/// connection instead of completing the message.
pub type ServeBody = UnsyncBoxBody<Bytes, io::Error>;

pub fn empty_body() -> ServeBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn full_body(data: impl Into<Bytes>) -> ServeBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Build a response from a status, a header set and a body
pub fn build_response(status: StatusCode, headers: &HeaderSet, body: ServeBody) -> Response<ServeBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers.to_header_map();
    response
}

/// Build a status line plus headers with an empty body.
///
/// This is the default writer for error outcomes.
pub fn build_status_response(status: StatusCode, headers: &HeaderSet) -> Response<ServeBody> {
    let mut headers = headers.clone();
    if status != StatusCode::NOT_MODIFIED {
        headers.insert("Content-Length", "0");
    }
    build_response(status, &headers, empty_body())
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ServeBody> {
    Response::builder()
        .status(405)
        .header("Content-Type", "text/plain")
        .header("Allow", "GET, HEAD, OPTIONS")
        .body(full_body("405 Method Not Allowed"))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            Response::new(full_body("405 Method Not Allowed"))
        })
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<ServeBody> {
    Response::builder()
        .status(204)
        .header("Allow", "GET, HEAD, OPTIONS")
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(empty_body())
        })
}

/// Build 500 response for a transport-level failure that never reached the dispatcher
pub fn build_500_response() -> Response<ServeBody> {
    Response::builder()
        .status(500)
        .header("Content-Length", "0")
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("500", &e);
            Response::new(empty_body())
        })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
