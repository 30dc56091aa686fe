//! Response header collection
//!
//! `HeaderSet` keeps insertion order and the caller's spelling of each name,
//! while lookups and replacement are case-insensitive. It is converted into a
//! hyper `HeaderMap` only when the response is built.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

use crate::logger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header. An existing entry keeps its position but
    /// takes the new spelling and value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Insert only when no header with this name exists yet
    pub fn insert_if_absent(&mut self, name: &str, value: impl Into<String>) {
        if !self.contains(name) {
            self.entries.push((name.to_string(), value.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Overlay `other` on top of `self`; values from `other` win.
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into a hyper header map. Entries hyper rejects are logged and skipped.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let parsed = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(n), Ok(v)) => {
                    map.insert(n, v);
                }
                _ => logger::log_warning(&format!("Dropping invalid header '{name}: {value}'")),
            }
        }
        map
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Raw value of a request header, `None` when absent or not valid UTF-8
pub fn request_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Request header value that is present and non-empty.
///
/// Conditional headers with an empty value are treated as if they were not sent.
pub fn non_empty_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request_header(headers, name).filter(|v| !v.trim().is_empty())
}

/// Split a header value into a list.
///
/// Every space is removed from each item and a lone empty value yields an
/// empty list.
pub fn listify(value: &str, sep: char) -> Vec<String> {
    let items: Vec<&str> = value.split(sep).collect();
    let single = items.len() == 1;
    items
        .into_iter()
        .map(|item| item.replace(' ', ""))
        .filter(|item| !(single && item.is_empty()))
        .collect()
}
