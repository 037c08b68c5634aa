//! List cache: liveness markers for filtered list queries.
//!
//! The list cache does not hold lists. It records, per filter key, whether a
//! list query is in progress and when it last settled; the resources
//! themselves live in the entity cache of their kind.
//!
//! Keys are built with [`ListKey`] by joining filter attributes with `-` in
//! the order each store documents. Reads fall back from the exact key to
//! progressively shorter prefixes, so a narrower filter that was never
//! fetched reuses the marker of a broader one. That reuse is intentional: a
//! narrower filter may report ready on data fetched only for the broader
//! filter.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Separator between list key segments.
pub const LIST_KEY_SEPARATOR: char = '-';

/// Namespace-relative key of a filtered list query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListKey(String);

impl ListKey {
    /// Key of the unfiltered list of a namespace.
    pub fn new(namespace: &str) -> Self {
        Self(escape(namespace))
    }

    /// Append a filter attribute. Empty attributes are skipped so an unset
    /// filter field yields the broader key.
    ///
    /// Separator characters inside the value are escaped, so every `-` in
    /// the key delimits a declared attribute.
    pub fn attr(mut self, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        if !value.is_empty() {
            self.0.push(LIST_KEY_SEPARATOR);
            self.0.push_str(&escape(value));
        }
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key with its last attribute dropped, or `None` for a bare
    /// namespace key.
    pub fn parent(&self) -> Option<ListKey> {
        self.0
            .rsplit_once(LIST_KEY_SEPARATOR)
            .map(|(head, _)| ListKey(head.to_string()))
    }

    /// Whether `self` is `other` or lies under it.
    pub fn starts_with(&self, other: &ListKey) -> bool {
        match self.0.strip_prefix(&other.0) {
            Some(rest) => rest.is_empty() || rest.starts_with(LIST_KEY_SEPARATOR),
            None => false,
        }
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            LIST_KEY_SEPARATOR => out.push_str("%2D"),
            c => out.push(c),
        }
    }
    out
}

/// Liveness marker of one list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListCacheEntry {
    /// When the marker last changed state.
    pub timestamp: DateTime<Utc>,
    pub is_fetching: bool,
}

/// Liveness markers of all list queries of a session.
#[derive(Debug, Default)]
pub struct ListCache {
    entries: Mutex<HashMap<ListKey, ListCacheEntry>>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker for `key`, falling back to the nearest broader key that has
    /// one. Returns the matched key with the marker.
    pub fn get_cache(&self, key: &ListKey) -> Option<(ListKey, ListCacheEntry)> {
        let entries = self.lock();
        let mut candidate = Some(key.clone());
        while let Some(current) = candidate {
            if let Some(entry) = entries.get(&current) {
                if current != *key {
                    debug!(key = %key, matched = %current, "list cache fallback");
                }
                return Some((current, *entry));
            }
            candidate = current.parent();
        }
        None
    }

    /// Marker for exactly `key`, with no fallback.
    pub fn get_exact(&self, key: &ListKey) -> Option<ListCacheEntry> {
        self.lock().get(key).copied()
    }

    /// Mark `key` as fetching. Returns `false` if a fetch for exactly this key
    /// is already in progress, in which case the caller must not start
    /// another.
    pub fn mark_fetching(&self, key: &ListKey) -> bool {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.is_fetching) {
            debug!(key = %key, "list fetch already in progress");
            return false;
        }
        entries.insert(
            key.clone(),
            ListCacheEntry {
                timestamp: Utc::now(),
                is_fetching: true,
            },
        );
        true
    }

    /// Record that the fetch for `key` settled successfully.
    pub fn mark_settled(&self, key: &ListKey) {
        self.lock().insert(
            key.clone(),
            ListCacheEntry {
                timestamp: Utc::now(),
                is_fetching: false,
            },
        );
    }

    /// Drop the marker of a failed fetch so a later caller may retry.
    pub fn mark_failed(&self, key: &ListKey) {
        self.lock().remove(key);
    }

    pub fn invalidate(&self, key: &ListKey) {
        self.lock().remove(key);
    }

    /// Drop `prefix` and every marker under it.
    pub fn invalidate_prefix(&self, prefix: &ListKey) {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        debug!(prefix = %prefix, dropped = before - entries.len(), "list markers invalidated");
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ListKey, ListCacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
