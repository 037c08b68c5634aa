//! Reconciliation of BASIC and FULL payloads of the same resource.
//!
//! Entries are stored under `(name, View)`. A whole FULL fetch is
//! authoritative and supersedes the BASIC entry; anything else merges into
//! the entry already cached, by name, over nested collections.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use vantage_core::{
    CacheError, DatabaseMetadata, Resource, SchemaMetadata, TableMetadata, View, ViewMetadata,
};

use crate::key::CacheKey;
use crate::namespace::NamespaceCache;

/// An item addressed by name inside a nested collection.
pub trait NamedItem {
    fn item_name(&self) -> &str;
}

impl NamedItem for SchemaMetadata {
    fn item_name(&self) -> &str {
        &self.name
    }
}

impl NamedItem for TableMetadata {
    fn item_name(&self) -> &str {
        &self.name
    }
}

impl NamedItem for ViewMetadata {
    fn item_name(&self) -> &str {
        &self.name
    }
}

/// A value that can absorb a partial payload of the same identity.
///
/// Implementations must be idempotent: merging the same payload twice
/// leaves the value as merging it once.
pub trait ViewMergeable {
    fn merge_from(&mut self, incoming: &Self);
}

/// For each incoming item, merge it into the same-named target item or
/// append it if absent.
pub fn merge_named<T, F>(target: &mut Vec<T>, incoming: &[T], mut merge: F)
where
    T: NamedItem + Clone,
    F: FnMut(&mut T, &T),
{
    for item in incoming {
        match target
            .iter_mut()
            .find(|existing| existing.item_name() == item.item_name())
        {
            Some(existing) => merge(existing, item),
            None => target.push(item.clone()),
        }
    }
}

/// [`merge_named`] for leaf items: same-named items are replaced in place.
pub fn replace_named<T: NamedItem + Clone>(target: &mut Vec<T>, incoming: &[T]) {
    merge_named(target, incoming, |existing, item| *existing = item.clone());
}

impl ViewMergeable for SchemaMetadata {
    fn merge_from(&mut self, incoming: &Self) {
        replace_named(&mut self.tables, &incoming.tables);
        replace_named(&mut self.views, &incoming.views);
    }
}

impl ViewMergeable for DatabaseMetadata {
    fn merge_from(&mut self, incoming: &Self) {
        if !incoming.character_set.is_empty() {
            self.character_set = incoming.character_set.clone();
        }
        if !incoming.collation.is_empty() {
            self.collation = incoming.collation.clone();
        }
        merge_named(&mut self.schemas, &incoming.schemas, |schema, item| {
            schema.merge_from(item)
        });
    }
}

/// How much of the entity a fetch covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchScope {
    /// The whole entity.
    Whole,
    /// One schema or table; the payload is partial whatever its view.
    Slice,
}

/// View-aware cache over a namespace keyed by `(name, View)`.
pub struct ViewedCache<V> {
    cache: Arc<NamespaceCache<CacheKey, V>>,
    // Serializes read-merge-write so concurrent merges do not lose items.
    merge_guard: Mutex<()>,
}

impl<V> ViewedCache<V>
where
    V: Resource + ViewMergeable,
{
    pub fn new(cache: Arc<NamespaceCache<CacheKey, V>>) -> Self {
        Self {
            cache,
            merge_guard: Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &Arc<NamespaceCache<CacheKey, V>> {
        &self.cache
    }

    /// Entry stored at exactly `view`.
    pub fn get(&self, name: &str, view: View) -> Result<Option<V>, CacheError> {
        Ok(self.cache.get_entity(&CacheKey::for_view(name, view)?))
    }

    /// The most complete entry for `name`: FULL first, then BASIC.
    pub fn get_best(&self, name: &str) -> Result<Option<(View, V)>, CacheError> {
        for view in [View::Full, View::Basic] {
            if let Some(value) = self.get(name, view)? {
                return Ok(Some((view, value)));
            }
        }
        Ok(None)
    }

    /// Reconcile a freshly fetched payload with what is cached for its name
    /// and return the entry now stored.
    pub fn apply(&self, incoming: V, origin: View, scope: FetchScope) -> Result<V, CacheError> {
        let name = incoming.name().to_string();
        let full_key = CacheKey::for_view(&name, View::Full)?;
        let basic_key = CacheKey::for_view(&name, View::Basic)?;
        let _guard = self.merge_guard.lock().unwrap_or_else(PoisonError::into_inner);

        if origin == View::Full && scope == FetchScope::Whole {
            debug!(name = %name, "full view supersedes basic");
            self.cache.invalidate_entity(&basic_key);
            self.cache.set_entity(full_key, incoming.clone());
            return Ok(incoming);
        }

        if let Some(mut full) = self.cache.get_entity(&full_key) {
            if origin == View::Basic {
                debug!(name = %name, "basic payload ignored, full view cached");
                return Ok(full);
            }
            full.merge_from(&incoming);
            self.cache.set_entity(full_key, full.clone());
            return Ok(full);
        }

        let merged = match self.cache.get_entity(&basic_key) {
            Some(mut basic) => {
                basic.merge_from(&incoming);
                basic
            }
            None => incoming,
        };
        self.cache.set_entity(basic_key, merged.clone());
        Ok(merged)
    }

    /// Drop both views of `name`.
    pub fn invalidate(&self, name: &str) -> Result<(), CacheError> {
        let _guard = self.merge_guard.lock().unwrap_or_else(PoisonError::into_inner);
        for view in [View::Basic, View::Full] {
            self.cache.invalidate_entity(&CacheKey::for_view(name, view)?);
        }
        Ok(())
    }
}
