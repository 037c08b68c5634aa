//! Namespace registry.
//!
//! The registry hands out one [`NamespaceCache`] per namespace name and
//! creates it on first access. Namespaces are stored type-erased so a single
//! registry can hold caches of different key and value types.

use std::any::{type_name, Any};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use vantage_core::CacheError;

use crate::list::ListCache;
use crate::namespace::{NamespaceCache, NamespaceKey, NamespaceValue};
use crate::stats::CacheStats;

/// Type-erased view of a namespace, enough to clear and report on it.
trait ErasedNamespace: Send + Sync {
    fn clear(&self);
    fn stats(&self) -> CacheStats;
    fn value_type(&self) -> &'static str;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: NamespaceKey, V: NamespaceValue> ErasedNamespace for NamespaceCache<K, V> {
    fn clear(&self) {
        NamespaceCache::clear(self);
    }

    fn stats(&self) -> CacheStats {
        NamespaceCache::stats(self)
    }

    fn value_type(&self) -> &'static str {
        type_name::<V>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// All caches of one client session.
#[derive(Default)]
pub struct CacheRegistry {
    namespaces: DashMap<String, Arc<dyn ErasedNamespace>>,
    lists: Arc<ListCache>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the namespace called `name`, creating it empty on first access.
    ///
    /// Later calls return the same instance. Asking for an existing namespace
    /// with different key or value types fails with
    /// [`CacheError::NamespaceTypeMismatch`].
    pub fn namespace<K: NamespaceKey, V: NamespaceValue>(
        &self,
        name: &str,
    ) -> Result<Arc<NamespaceCache<K, V>>, CacheError> {
        let erased = self
            .namespaces
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(namespace = %name, value_type = type_name::<V>(), "namespace created");
                Arc::new(NamespaceCache::<K, V>::new(name)) as Arc<dyn ErasedNamespace>
            })
            .clone();

        let value_type = erased.value_type();
        erased
            .into_any()
            .downcast::<NamespaceCache<K, V>>()
            .map_err(|_| CacheError::NamespaceTypeMismatch {
                namespace: name.to_string(),
                value_type,
            })
    }

    /// Shared list cache.
    pub fn lists(&self) -> Arc<ListCache> {
        Arc::clone(&self.lists)
    }

    /// Names of all namespaces created so far, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Per-namespace statistics, sorted by namespace name.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        let mut stats: Vec<(String, CacheStats)> = self
            .namespaces
            .iter()
            .map(|e| (e.key().clone(), e.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Empty every namespace and the list cache. Namespaces stay registered.
    pub fn clear_all(&self) {
        for entry in self.namespaces.iter() {
            entry.value().clear();
        }
        self.lists.clear();
        info!(namespaces = self.namespaces.len(), "all caches cleared");
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("namespaces", &self.namespaces())
            .finish_non_exhaustive()
    }
}
