//! Accept-Encoding negotiation
//!
//! Only answers one question: has the client explicitly refused an encoding?

use hyper::HeaderMap;

use super::headers::{listify, request_header};

/// Content coding of generated archives
pub const ARCHIVE_ENCODING: &str = "deflate";

/// Whether the client accepts `encoding`.
///
/// No header means anything is acceptable and an empty header accepts
/// nothing. Otherwise the encoding is refused only by a zero weight on
/// `identity`, `*` or the encoding itself.
pub fn accepts_encoding(headers: &HeaderMap, encoding: &str) -> bool {
    let Some(value) = request_header(headers, "accept-encoding") else {
        return true;
    };
    if value.trim().is_empty() {
        return false;
    }

    let encoding = encoding.to_ascii_lowercase();
    !listify(&value.to_ascii_lowercase(), ',')
        .iter()
        .any(|token| refuses(token, &encoding))
}

fn refuses(token: &str, encoding: &str) -> bool {
    let mut parts = token.split(';');
    let name = parts.next().unwrap_or_default();
    if name != "identity" && name != "*" && name != encoding {
        return false;
    }
    parts
        .filter_map(|param| param.strip_prefix("q="))
        .any(is_zero_weight)
}

fn is_zero_weight(q: &str) -> bool {
    matches!(q, "0" | "0." | "0.0" | "0.00" | "0.000")
}
