//! HTTP Range request parsing module
//!
//! Single byte-range support compliant with RFC 7233, including the
//! interaction with `If-Range`.

use hyper::HeaderMap;

use super::date::now_millis;
use super::headers::non_empty_header;
use super::precondition::evaluate_if_range_at;

const BYTES_UNIT: &str = "bytes=";

/// Inclusive byte interval, always within `0..size` of the resource it was parsed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Full interval of a resource, `None` for an empty one
    pub fn full(size: u64) -> Option<Self> {
        size.checked_sub(1).map(|end| Self { start: 0, end })
    }

    /// Number of bytes in the interval
    #[inline]
    pub const fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// What to send for a request, given its `Range` and `If-Range` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeResolution {
    /// Send the whole resource
    Full,
    /// Send only this interval with 206
    Partial(ByteRange),
    /// `Range` was sent but cannot be honoured - respond 416
    Unsatisfiable,
}

impl RangeResolution {
    pub const fn is_satisfiable(&self) -> bool {
        !matches!(self, Self::Unsatisfiable)
    }
}

/// Parse a `Range` header against a resource size.
///
/// Supported formats:
/// - `bytes=start-end` - Specific range
/// - `bytes=start-` - From start to end of resource
/// - `bytes=-suffix` - Last suffix bytes
///
/// Multiple ranges, other units, and bounds outside `0..size` yield `None`.
///
/// # Examples
/// ```
/// use zipserve::http::range::{parse_range, ByteRange};
///
/// assert_eq!(parse_range("bytes=-8", 20), Some(ByteRange { start: 12, end: 19 }));
/// assert_eq!(parse_range("bytes=0-20", 20), None);
/// ```
pub fn parse_range(header: &str, size: u64) -> Option<ByteRange> {
    let header = header.trim().to_ascii_lowercase();
    let spec = header.strip_prefix(BYTES_UNIT)?;

    // Only a single range is supported
    if spec.contains(',') {
        return None;
    }

    let (start_str, end_str) = spec.split_once('-')?;
    let start = parse_bound(start_str);
    let end = parse_bound(end_str);

    let (start, end) = match (start, end) {
        // Suffix range: "-500" means last 500 bytes
        (None, Some(suffix)) => (size.checked_sub(suffix)?, size.checked_sub(1)?),
        // Open range: "500-" runs to the end
        (Some(start), None) => (start, size.checked_sub(1)?),
        (Some(start), Some(end)) => (start, end),
        (None, None) => return None,
    };

    (end < size && start <= end).then_some(ByteRange { start, end })
}

fn parse_bound(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok()
}

/// Decide how to honour `Range` for a resource.
///
/// A failing `If-Range` makes the server ignore `Range` and send everything.
/// A `Range` that does not parse to a satisfiable interval is unsatisfiable.
pub fn resolve_range_for_request(
    headers: &HeaderMap,
    modified_at_ms: i64,
    tag: Option<&str>,
    size: u64,
) -> RangeResolution {
    resolve_range_at(headers, modified_at_ms, tag, size, now_millis())
}

pub(crate) fn resolve_range_at(
    headers: &HeaderMap,
    modified_at_ms: i64,
    tag: Option<&str>,
    size: u64,
    now_ms: i64,
) -> RangeResolution {
    if let Some(if_range) = non_empty_header(headers, "if-range") {
        if !evaluate_if_range_at(modified_at_ms, tag, if_range, now_ms) {
            return RangeResolution::Full;
        }
    }

    let Some(range_header) = non_empty_header(headers, "range") else {
        return RangeResolution::Full;
    };

    match parse_range(range_header, size) {
        Some(range) => RangeResolution::Partial(range),
        None => RangeResolution::Unsatisfiable,
    }
}
