//! Conditional request evaluation (RFC 7232)
//!
//! Pure functions over an entity tag, a modification time and the request's
//! `If-*` headers. Callers map the verdicts to 412 and 304.

use hyper::HeaderMap;

use super::date::{now_millis, parse_http_date};
use super::headers::{listify, non_empty_header};

/// Prefix of a weak entity tag after header values are lower-cased
pub const WEAK_PREFIX: &str = "w/";

/// Result of evaluating conditional headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionVerdict {
    Proceed,
    NotModified,
    PreconditionFailed,
}

fn is_wildcard(header: &str) -> bool {
    let trimmed = header.trim();
    trimmed == "*" || trimmed == "\"*\""
}

/// `If-Match` semantics with strong comparison.
///
/// True for a wildcard when a tag exists, or when the tag appears in the
/// list. Weak validators (`W/"..."`) never match.
pub fn matches_if_match(tag: Option<&str>, header: &str) -> bool {
    let Some(tag) = tag else {
        return false;
    };
    if is_wildcard(header) {
        return true;
    }
    let tag = tag.to_ascii_lowercase();
    listify(&header.to_ascii_lowercase(), ',')
        .iter()
        .any(|item| *item == tag)
}

/// `If-None-Match` semantics with weak comparison.
///
/// True when neither the tag nor its weak form appears in the list, i.e.
/// the client's cached copy is not current.
pub fn fails_if_none_match(tag: Option<&str>, header: &str) -> bool {
    let Some(tag) = tag else {
        return true;
    };
    let tag = tag.to_ascii_lowercase();
    let weak = format!("{WEAK_PREFIX}{tag}");
    listify(&header.to_ascii_lowercase(), ',')
        .iter()
        .all(|item| *item != tag && *item != weak)
}

/// True when the resource changed after the header date.
///
/// An unparsable date counts as modified; a header date later than the
/// current clock never does.
pub fn is_modified_since(modified_at_ms: i64, header: &str) -> bool {
    is_modified_since_at(modified_at_ms, header, now_millis())
}

pub(crate) fn is_modified_since_at(modified_at_ms: i64, header: &str, now_ms: i64) -> bool {
    parse_http_date(header).map_or(true, |since| since <= now_ms && since < modified_at_ms)
}

/// True when the resource has not changed since the header date.
///
/// An unparsable date lets the request proceed.
pub fn is_unmodified_since(modified_at_ms: i64, header: &str) -> bool {
    is_unmodified_since_at(modified_at_ms, header, now_millis())
}

pub(crate) fn is_unmodified_since_at(modified_at_ms: i64, header: &str, now_ms: i64) -> bool {
    parse_http_date(header).map_or(true, |since| since <= now_ms && since > modified_at_ms)
}

/// `If-Range`: a date is compared like `If-Unmodified-Since`, anything else
/// is treated as an entity-tag list with strong comparison.
pub fn evaluate_if_range(modified_at_ms: i64, tag: Option<&str>, header: &str) -> bool {
    evaluate_if_range_at(modified_at_ms, tag, header, now_millis())
}

pub(crate) fn evaluate_if_range_at(
    modified_at_ms: i64,
    tag: Option<&str>,
    header: &str,
    now_ms: i64,
) -> bool {
    if parse_http_date(header).is_some() {
        is_unmodified_since_at(modified_at_ms, header, now_ms)
    } else {
        matches_if_match(tag, header)
    }
}

/// `If-Match`, then `If-Unmodified-Since` only when `If-Match` is absent.
pub fn evaluate_preconditions(
    modified_at_ms: i64,
    tag: Option<&str>,
    headers: &HeaderMap,
) -> PreconditionVerdict {
    evaluate_preconditions_at(modified_at_ms, tag, headers, now_millis())
}

pub(crate) fn evaluate_preconditions_at(
    modified_at_ms: i64,
    tag: Option<&str>,
    headers: &HeaderMap,
    now_ms: i64,
) -> PreconditionVerdict {
    if let Some(if_match) = non_empty_header(headers, "if-match") {
        if !matches_if_match(tag, if_match) {
            return PreconditionVerdict::PreconditionFailed;
        }
        return PreconditionVerdict::Proceed;
    }

    if let Some(since) = non_empty_header(headers, "if-unmodified-since") {
        if !is_unmodified_since_at(modified_at_ms, since, now_ms) {
            return PreconditionVerdict::PreconditionFailed;
        }
    }

    PreconditionVerdict::Proceed
}

/// `If-None-Match`, then `If-Modified-Since` only when `If-None-Match` is absent.
pub fn evaluate_freshness(
    modified_at_ms: i64,
    tag: Option<&str>,
    headers: &HeaderMap,
) -> PreconditionVerdict {
    evaluate_freshness_at(modified_at_ms, tag, headers, now_millis())
}

pub(crate) fn evaluate_freshness_at(
    modified_at_ms: i64,
    tag: Option<&str>,
    headers: &HeaderMap,
    now_ms: i64,
) -> PreconditionVerdict {
    if let Some(if_none_match) = non_empty_header(headers, "if-none-match") {
        if !fails_if_none_match(tag, if_none_match) {
            return PreconditionVerdict::NotModified;
        }
        return PreconditionVerdict::Proceed;
    }

    if let Some(since) = non_empty_header(headers, "if-modified-since") {
        if !is_modified_since_at(modified_at_ms, since, now_ms) {
            return PreconditionVerdict::NotModified;
        }
    }

    PreconditionVerdict::Proceed
}
