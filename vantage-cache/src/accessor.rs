//! Generic resource accessor.
//!
//! [`ResourceStore`] binds one resource kind's namespace to its remote
//! service. Entries and fetches are keyed by `(name, view)`, so a BASIC
//! answer never stands in for a FULL read. Every read goes through the
//! namespace's single-flight get-or-fetch; mutations feed the returned
//! resource back into the cache and drop the kind's list markers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};
use vantage_core::{
    CacheConfig, CacheError, FieldMask, GetRequest, ListRequest, Resource, ResourceError,
    ResourceResult, ResourceService, View,
};

use crate::compose::{is_resolvable, ResolvedReferences};
use crate::key::CacheKey;
use crate::list::{ListCache, ListKey};
use crate::namespace::{NamespaceCache, PendingFetch};
use crate::registry::CacheRegistry;

/// Result of [`ResourceStore::fetch_list`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome<R> {
    /// Every page was fetched and cached.
    Fetched(Vec<R>),
    /// A fetch for the same exact filter is already in progress.
    AlreadyFetching,
}

/// Most complete view first.
const VIEWS: [View; 2] = [View::Full, View::Basic];

fn view_key(name: &str, view: View) -> ResourceResult<CacheKey> {
    CacheKey::for_view(name, view).map_err(|err| ResourceError::InvalidName {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

fn is_full_key(key: &CacheKey) -> bool {
    key.components().last().map(String::as_str) == Some(View::Full.as_str())
}

/// Clears a list's in-progress marker unless the fetch settled, so a fetch
/// dropped mid-flight does not block the next one.
struct ListFetchGuard<'a> {
    lists: &'a ListCache,
    key: &'a ListKey,
    settled: bool,
}

impl Drop for ListFetchGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.lists.mark_failed(self.key);
        }
    }
}

/// Cache-backed accessor for one resource kind.
pub struct ResourceStore<R: Resource> {
    cache: Arc<NamespaceCache<CacheKey, R>>,
    service: Arc<dyn ResourceService<R>>,
    lists: Arc<ListCache>,
    config: CacheConfig,
}

impl<R: Resource> Clone for ResourceStore<R> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            service: Arc::clone(&self.service),
            lists: Arc::clone(&self.lists),
            config: self.config.clone(),
        }
    }
}

impl<R: Resource> ResourceStore<R> {
    /// Bind the kind's namespace in `registry` to `service`.
    pub fn new(
        registry: &CacheRegistry,
        service: Arc<dyn ResourceService<R>>,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: registry.namespace::<CacheKey, R>(R::kind().namespace())?,
            service,
            lists: registry.lists(),
            config,
        })
    }

    pub fn namespace(&self) -> &Arc<NamespaceCache<CacheKey, R>> {
        &self.cache
    }

    pub fn service(&self) -> &Arc<dyn ResourceService<R>> {
        &self.service
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Root list key of this kind; every filter key lies under it.
    pub fn list_key(&self) -> ListKey {
        ListKey::new(R::kind().list_namespace())
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Cached resource, or the fetch in flight for it, or a new fetch.
    pub async fn get_or_fetch(&self, name: &str) -> ResourceResult<R> {
        self.get_or_fetch_view(name, View::Full).await
    }

    /// [`ResourceStore::get_or_fetch`] asking the service for `view`. A
    /// cached FULL entry answers a BASIC read; a BASIC entry never answers a
    /// FULL one.
    pub async fn get_or_fetch_view(&self, name: &str, view: View) -> ResourceResult<R> {
        if !is_resolvable(name) {
            return Err(ResourceError::not_found(name));
        }
        if view != View::Full {
            if let Some(full) = self.lookup(name, View::Full) {
                return Ok(full);
            }
        }
        self.pending(view_key(name, view)?).await
    }

    fn pending(&self, key: CacheKey) -> PendingFetch<R> {
        let service = Arc::clone(&self.service);
        let view = if is_full_key(&key) { View::Full } else { View::Basic };
        let request = GetRequest::new(key.head()).with_view(view);
        self.cache
            .get_or_fetch(key, move || async move { service.get(&request).await })
    }

    /// Cached entry of `name` at a view satisfying `wanted`, most complete
    /// first.
    fn lookup(&self, name: &str, wanted: View) -> Option<R> {
        VIEWS
            .into_iter()
            .filter(|view| view.satisfies(wanted))
            .filter_map(|view| CacheKey::for_view(name, view).ok())
            .find_map(|key| self.cache.get_entity(&key))
    }

    /// Most complete cached resource, if any. Never fetches.
    pub fn peek(&self, name: &str) -> Option<R> {
        self.lookup(name, View::Basic)
    }

    /// Cached resource, or its placeholder. Never fetches.
    pub fn get_cached(&self, name: &str) -> R {
        self.peek(name).unwrap_or_else(|| R::unknown(name))
    }

    /// Write a complete resource obtained out of band. It supersedes any
    /// BASIC entry.
    pub fn set(&self, resource: R) {
        let name = resource.name().to_string();
        let (Ok(full), Ok(basic)) = (
            CacheKey::for_view(&name, View::Full),
            CacheKey::for_view(&name, View::Basic),
        ) else {
            warn!(namespace = %self.cache.name(), name = %name, "name cannot be keyed, not cached");
            return;
        };
        self.cache.set_entity(full, resource);
        self.cache.invalidate_entity(&basic);
    }

    /// Drop every view of the cached resource and forget any fetch in flight
    /// for it, so the next read goes to the service.
    pub fn invalidate(&self, name: &str) {
        for key in VIEWS
            .into_iter()
            .filter_map(|view| CacheKey::for_view(name, view).ok())
        {
            self.cache.invalidate_entity(&key);
            self.cache.invalidate_request(&key);
        }
    }

    // ========================================================================
    // REFERENCE RESOLUTION
    // ========================================================================

    /// Resolve many names at once for composition.
    ///
    /// Empty and placeholder names are skipped, cached names are answered
    /// from the cache, and names already in flight are awaited. The rest are
    /// fetched in chunks of `batch_get_limit` through `batch_get`, or one by
    /// one when the service has no batch endpoint. Failures are recorded,
    /// never returned.
    pub async fn resolve_many<I, S>(&self, names: I) -> ResolvedReferences<R>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resolved = ResolvedReferences::default();
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for name in names {
            let name = name.into();
            if !is_resolvable(&name) || !seen.insert(name.clone()) {
                continue;
            }
            if let Some(resource) = self.lookup(&name, View::Full) {
                resolved.insert(name, resource);
                continue;
            }
            match view_key(&name, View::Full) {
                Ok(key) => missing.push(key),
                Err(err) => resolved.insert_failure(name, err),
            }
        }

        if missing.is_empty() {
            return resolved;
        }
        debug!(
            namespace = %self.cache.name(),
            count = missing.len(),
            batch = self.service.supports_batch_get(),
            "resolving references"
        );

        let pending: Vec<(CacheKey, PendingFetch<R>)> = if self.service.supports_batch_get() {
            let limit = self.config.batch_get_limit.max(1);
            missing
                .chunks(limit)
                .flat_map(|chunk| self.batch_pending(chunk.to_vec()))
                .collect()
        } else {
            missing
                .into_iter()
                .map(|key| {
                    let fetch = self.pending(key.clone());
                    (key, fetch)
                })
                .collect()
        };

        let (keys, fetches): (Vec<CacheKey>, Vec<PendingFetch<R>>) = pending.into_iter().unzip();
        for (key, outcome) in keys.into_iter().zip(join_all(fetches).await) {
            let name = key.head().to_string();
            match outcome {
                Ok(resource) => resolved.insert(name, resource),
                Err(err) => {
                    let err = if err.is_not_found() {
                        ResourceError::not_found(name.as_str())
                    } else {
                        err
                    };
                    warn!(namespace = %self.cache.name(), name = %name, error = %err, "reference unresolved, using placeholder");
                    resolved.insert_failure(name, err);
                }
            }
        }
        resolved
    }

    fn batch_pending(&self, chunk: Vec<CacheKey>) -> Vec<(CacheKey, PendingFetch<R>)> {
        let service = Arc::clone(&self.service);
        self.cache.get_or_fetch_many(chunk, move |keys| async move {
            let names: Vec<String> = keys.iter().map(|key| key.head().to_string()).collect();
            let resources = service.batch_get(&names).await?;
            Ok(resources
                .into_iter()
                .filter_map(|resource| {
                    let key = CacheKey::for_view(resource.name(), View::Full).ok()?;
                    Some((key, resource))
                })
                .collect())
        })
    }

    // ========================================================================
    // LISTS
    // ========================================================================

    /// Fetch every page of a filtered list, caching each resource and the
    /// list's liveness marker under `key`.
    ///
    /// Returns [`ListOutcome::AlreadyFetching`] without calling the service if
    /// a fetch for exactly `key` is in progress. A failed page drops the
    /// marker so the list can be fetched again, and so does dropping the
    /// returned future before it completes.
    pub async fn fetch_list(
        &self,
        key: &ListKey,
        mut request: ListRequest,
    ) -> ResourceResult<ListOutcome<R>> {
        if !self.lists.mark_fetching(key) {
            return Ok(ListOutcome::AlreadyFetching);
        }
        let mut guard = ListFetchGuard {
            lists: &self.lists,
            key,
            settled: false,
        };
        if request.page_size <= 0 {
            request.page_size = self.config.list_page_size;
        }

        let mut resources = Vec::new();
        loop {
            let page = match self.service.list(&request).await {
                Ok(page) => page,
                Err(err) => {
                    debug!(key = %key, error = %err, "list fetch failed");
                    return Err(err);
                }
            };
            for resource in &page.resources {
                self.set(resource.clone());
            }
            resources.extend(page.resources);
            if page.next_page_token.is_empty() {
                break;
            }
            request.page_token = page.next_page_token;
        }

        self.lists.mark_settled(key);
        guard.settled = true;
        debug!(key = %key, count = resources.len(), "list fetched");
        Ok(ListOutcome::Fetched(resources))
    }

    /// Cached resources matching `filter`, one per name at its most complete
    /// view, sorted by name. Placeholders are never listed.
    pub fn list_cached<F>(&self, filter: F) -> Vec<R>
    where
        F: Fn(&R) -> bool,
    {
        let mut by_name: BTreeMap<String, R> = BTreeMap::new();
        for (key, resource) in self.cache.entries() {
            if is_full_key(&key) {
                by_name.insert(key.head().to_string(), resource);
            } else {
                by_name.entry(key.head().to_string()).or_insert(resource);
            }
        }
        by_name
            .into_values()
            .filter(|resource| !resource.is_placeholder() && filter(resource))
            .collect()
    }

    /// Whether a settled list fetch covers `key`, directly or through a
    /// broader filter.
    pub fn is_list_ready(&self, key: &ListKey) -> bool {
        self.lists
            .get_cache(key)
            .is_some_and(|(_, entry)| !entry.is_fetching)
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Update through the service and cache the stored result.
    pub async fn update(&self, resource: &R, field_mask: &FieldMask) -> ResourceResult<R> {
        let updated = self.service.update(resource, field_mask).await?;
        self.invalidate(updated.name());
        self.set(updated.clone());
        self.lists.invalidate_prefix(&self.list_key());
        Ok(updated)
    }

    /// Delete through the service and drop the cached resource.
    pub async fn delete(&self, name: &str) -> ResourceResult<()> {
        self.service.delete(name).await?;
        self.invalidate(name);
        self.lists.invalidate_prefix(&self.list_key());
        Ok(())
    }

    /// Restore through the service and cache the restored resource.
    pub async fn undelete(&self, name: &str) -> ResourceResult<R> {
        let restored = self.service.undelete(name).await?;
        self.invalidate(restored.name());
        self.set(restored.clone());
        self.lists.invalidate_prefix(&self.list_key());
        Ok(restored)
    }
}

impl<R: Resource> std::fmt::Debug for ResourceStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("namespace", &self.cache.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
