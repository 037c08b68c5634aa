//! Database metadata store.
//!
//! Metadata can be fetched at BASIC or FULL view, for the whole database or
//! for one schema or table. Payloads are reconciled in a [`ViewedCache`];
//! a second namespace keyed by `(name, view, schema, table)` coalesces
//! identical requests and remembers which requests have been answered.

use std::sync::Arc;

use tracing::debug;
use vantage_cache::{is_resolvable, CacheKey, FetchScope, NamespaceCache, ViewedCache};
use vantage_core::{
    CacheError, DatabaseMetadata, GetRequest, Resource, ResourceError, ResourceResult,
    ResourceService, Slice, TableMetadata, VantageError, View,
};

use crate::context::StoreContext;
use crate::notifications::Notification;

/// Namespace of answered metadata requests.
pub const METADATA_REQUEST_NAMESPACE: &str = "database-metadata-request";

#[derive(Clone)]
pub struct DatabaseMetadataStore {
    viewed: Arc<ViewedCache<DatabaseMetadata>>,
    requests: Arc<NamespaceCache<CacheKey, DatabaseMetadata>>,
    service: Arc<dyn ResourceService<DatabaseMetadata>>,
    context: StoreContext,
}

fn request_key(request: &GetRequest) -> Result<CacheKey, CacheError> {
    let (schema, table) = match &request.slice {
        Some(slice) => (slice.schema.as_str(), slice.table.as_deref().unwrap_or_default()),
        None => ("", ""),
    };
    CacheKey::builder()
        .component(request.name.as_str())
        .component(request.view.as_str())
        .component(schema)
        .component(table)
        .build()
}

fn invalid_name(name: &str, err: CacheError) -> ResourceError {
    ResourceError::InvalidName {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

impl DatabaseMetadataStore {
    pub fn new(
        context: &StoreContext,
        service: Arc<dyn ResourceService<DatabaseMetadata>>,
    ) -> Result<Self, VantageError> {
        let registry = context.registry();
        Ok(Self {
            viewed: Arc::new(ViewedCache::new(
                registry.namespace(DatabaseMetadata::kind().namespace())?,
            )),
            requests: registry.namespace(METADATA_REQUEST_NAMESPACE)?,
            service,
            context: context.clone(),
        })
    }

    /// Metadata answering `request`, from cache when a FULL entry or an
    /// earlier identical request covers it.
    pub async fn get_or_fetch(&self, request: GetRequest) -> ResourceResult<DatabaseMetadata> {
        let name = request.name.clone();
        self.fetch(request).await.map_err(|err| {
            if !err.is_not_found() {
                self.context.notify(Notification::error(format!(
                    "Failed to load database metadata {}: {}",
                    name, err
                )));
            }
            err
        })
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) without notifications;
    /// missing or forbidden metadata yields the placeholder.
    pub async fn get_or_fetch_silent(
        &self,
        request: GetRequest,
    ) -> ResourceResult<DatabaseMetadata> {
        let name = request.name.clone();
        match self.fetch(request).await {
            Err(err) if err.is_not_found() || err.is_unauthorized() => {
                Ok(DatabaseMetadata::unknown(&name))
            }
            other => other,
        }
    }

    /// FULL metadata of one table.
    pub async fn get_table(
        &self,
        name: &str,
        schema: &str,
        table: &str,
    ) -> ResourceResult<TableMetadata> {
        let request = GetRequest::new(name)
            .with_view(View::Full)
            .with_slice(Some(Slice::table(schema, table)));
        self.get_or_fetch(request)
            .await?
            .table(schema, table)
            .cloned()
            .ok_or_else(|| ResourceError::not_found(format!("{}/{}/{}", name, schema, table)))
    }

    /// Most complete cached metadata, or the placeholder. Never fetches.
    pub fn get_cached(&self, name: &str) -> DatabaseMetadata {
        self.viewed
            .get_best(name)
            .ok()
            .flatten()
            .map(|(_, metadata)| metadata)
            .unwrap_or_else(|| DatabaseMetadata::unknown(name))
    }

    /// The view of the most complete cached entry.
    pub fn cached_view(&self, name: &str) -> Option<View> {
        self.viewed.get_best(name).ok().flatten().map(|(view, _)| view)
    }

    /// Drop both views of `name` and forget every request for it. Fetches
    /// in flight for `name` no longer write back.
    pub fn invalidate(&self, name: &str) -> Result<(), CacheError> {
        self.requests.invalidate_matching(|key| key.head() == name);
        self.viewed.invalidate(name)
    }

    async fn fetch(&self, request: GetRequest) -> ResourceResult<DatabaseMetadata> {
        if !is_resolvable(&request.name) {
            return Err(ResourceError::not_found(request.name));
        }
        if let Some(cached) = self.cached_for(&request)? {
            return Ok(cached);
        }

        let key = request_key(&request).map_err(|e| invalid_name(&request.name, e))?;
        let scope = if request.slice.is_some() {
            FetchScope::Slice
        } else {
            FetchScope::Whole
        };
        debug!(key = %key, ?scope, "fetching database metadata");

        let service = Arc::clone(&self.service);
        let viewed = Arc::clone(&self.viewed);
        self.requests
            .get_or_fetch_tracked(key, move |ticket| async move {
                let payload = service.get(&request).await?;
                // Invalidation holds the request lock, so it cannot slip
                // between the check and the merge.
                match ticket.if_current(|| viewed.apply(payload.clone(), request.view, scope)) {
                    Some(merged) => merged.map_err(|e| invalid_name(&request.name, e)),
                    None => {
                        debug!(key = %ticket.key(), "metadata invalidated during fetch, not merged");
                        Ok(payload)
                    }
                }
            })
            .await
    }

    fn cached_for(&self, request: &GetRequest) -> ResourceResult<Option<DatabaseMetadata>> {
        let name = request.name.as_str();
        let map_err = |e| invalid_name(name, e);

        if let Some(full) = self.viewed.get(name, View::Full).map_err(map_err)? {
            return Ok(Some(full));
        }

        let exact = request_key(request).map_err(map_err)?;
        let whole_basic = request_key(&GetRequest::new(name).with_view(View::Basic)).map_err(map_err)?;
        let answered = self.requests.contains_entity(&exact)
            || (request.view == View::Basic && self.requests.contains_entity(&whole_basic));
        if !answered {
            return Ok(None);
        }

        Ok(self
            .viewed
            .get_best(name)
            .map_err(map_err)?
            .map(|(_, metadata)| metadata)
            .or_else(|| self.requests.get_entity(&exact)))
    }
}

impl std::fmt::Debug for DatabaseMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseMetadataStore")
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vantage_test_utils::fixtures::{
        database_metadata, project_metadata, schema, table, METADATA_NAME,
    };
    use vantage_test_utils::MockResourceService;

    fn service() -> Arc<MockResourceService<DatabaseMetadata>> {
        let metadata = database_metadata(vec![
            schema(
                "public",
                vec![table("orders", &["id", "total"]), table("users", &["id", "email"])],
            ),
            schema("audit", vec![table("log", &["at", "event"])]),
        ]);
        Arc::new(MockResourceService::with_resources(vec![metadata]).with_projection(project_metadata))
    }

    fn store(service: &Arc<MockResourceService<DatabaseMetadata>>) -> DatabaseMetadataStore {
        DatabaseMetadataStore::new(&StoreContext::default(), service.clone()).unwrap()
    }

    fn basic() -> GetRequest {
        GetRequest::new(METADATA_NAME).with_view(View::Basic)
    }

    #[tokio::test]
    async fn test_basic_request_is_cached() {
        let service = service();
        let store = store(&service);

        let first = store.get_or_fetch(basic()).await.unwrap();
        assert!(first.table("public", "orders").unwrap().columns.is_empty());
        store.get_or_fetch(basic()).await.unwrap();

        assert_eq!(service.get_calls(), 1);
        assert_eq!(store.cached_view(METADATA_NAME), Some(View::Basic));
    }

    #[tokio::test]
    async fn test_table_slice_merges_into_basic() {
        let service = service();
        let store = store(&service);
        store.get_or_fetch(basic()).await.unwrap();

        let orders = store.get_table(METADATA_NAME, "public", "orders").await.unwrap();
        assert_eq!(orders.columns.len(), 2);

        let cached = store.get_cached(METADATA_NAME);
        assert_eq!(cached.table("public", "orders").unwrap().columns.len(), 2);
        assert!(cached.table("public", "users").unwrap().columns.is_empty());
        assert!(cached.table("audit", "log").is_some());
        // A sliced FULL payload does not make the entry FULL.
        assert_eq!(store.cached_view(METADATA_NAME), Some(View::Basic));

        store.get_table(METADATA_NAME, "public", "orders").await.unwrap();
        assert_eq!(service.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_full_answers_every_request() {
        let service = service();
        let store = store(&service);
        store.get_or_fetch(basic()).await.unwrap();
        store
            .get_or_fetch(GetRequest::new(METADATA_NAME))
            .await
            .unwrap();
        assert_eq!(store.cached_view(METADATA_NAME), Some(View::Full));

        store.get_or_fetch(basic()).await.unwrap();
        let log = store.get_table(METADATA_NAME, "audit", "log").await.unwrap();
        assert_eq!(log.columns.len(), 2);
        assert_eq!(service.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_coalesce() {
        let service = service();
        let store = store(&service);
        service.pause();

        let a = tokio::spawn({
            let store = store.clone();
            async move { store.get_table(METADATA_NAME, "public", "users").await }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.get_table(METADATA_NAME, "public", "users").await }
        });
        for _ in 0..100 {
            if service.get_calls() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.resume();

        assert_eq!(a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(service.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_skips_merge() {
        let service = service();
        let store = store(&service);
        service.pause();

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.get_or_fetch(basic()).await }
        });
        for _ in 0..100 {
            if service.get_calls() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        store.invalidate(METADATA_NAME).unwrap();
        service.resume();

        assert!(pending.await.unwrap().is_ok());
        assert_eq!(store.cached_view(METADATA_NAME), None);
        assert!(store.get_cached(METADATA_NAME).is_placeholder());
    }

    /// Answers each `get` with whatever the test sends on that call's
    /// channel, in call order.
    #[derive(Default)]
    struct SteppedService {
        replies: std::sync::Mutex<Vec<tokio::sync::oneshot::Receiver<DatabaseMetadata>>>,
        started: std::sync::atomic::AtomicUsize,
    }

    impl SteppedService {
        fn expect_call(&self) -> tokio::sync::oneshot::Sender<DatabaseMetadata> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.replies.lock().unwrap().push(rx);
            tx
        }

        fn started(&self) -> usize {
            self.started.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ResourceService<DatabaseMetadata> for SteppedService {
        async fn get(&self, request: &GetRequest) -> ResourceResult<DatabaseMetadata> {
            let reply = self.replies.lock().unwrap().remove(0);
            self.started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            reply
                .await
                .map_err(|_| ResourceError::not_found(request.name.clone()))
        }

        async fn list(
            &self,
            _request: &vantage_core::ListRequest,
        ) -> ResourceResult<vantage_core::ListPage<DatabaseMetadata>> {
            Ok(vantage_core::ListPage {
                resources: Vec::new(),
                next_page_token: String::new(),
            })
        }
    }

    async fn wait_for_calls(service: &SteppedService, calls: usize) {
        for _ in 0..200 {
            if service.started() >= calls {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service saw {} calls, wanted {}", service.started(), calls);
    }

    #[tokio::test]
    async fn test_stale_fetch_does_not_merge_after_reregistration() {
        let service = Arc::new(SteppedService::default());
        let store = DatabaseMetadataStore::new(&StoreContext::default(), service.clone()).unwrap();
        let stale_reply = service.expect_call();
        let fresh_reply = service.expect_call();

        let stale = tokio::spawn({
            let store = store.clone();
            async move { store.get_or_fetch(basic()).await }
        });
        wait_for_calls(&service, 1).await;
        store.invalidate(METADATA_NAME).unwrap();

        // The same request registers again while the first is still out.
        let fresh = tokio::spawn({
            let store = store.clone();
            async move { store.get_or_fetch(basic()).await }
        });
        wait_for_calls(&service, 2).await;

        stale_reply
            .send(database_metadata(vec![schema("stale", vec![])]))
            .unwrap();
        let stale = stale.await.unwrap().unwrap();
        assert!(stale.schema("stale").is_some());
        assert!(store.get_cached(METADATA_NAME).is_placeholder());

        fresh_reply
            .send(database_metadata(vec![schema("fresh", vec![])]))
            .unwrap();
        fresh.await.unwrap().unwrap();
        let cached = store.get_cached(METADATA_NAME);
        assert!(cached.schema("fresh").is_some());
        assert!(cached.schema("stale").is_none());
    }

    #[tokio::test]
    async fn test_silent_fetch_of_forbidden_metadata() {
        let service = service();
        service.fail_next(ResourceError::Unauthorized {
            name: METADATA_NAME.to_string(),
            reason: "no access to instance prod".to_string(),
        });
        let store = store(&service);

        let metadata = store.get_or_fetch_silent(basic()).await.unwrap();
        assert!(metadata.is_placeholder());
        assert_eq!(store.cached_view(METADATA_NAME), None);

        let metadata = store.get_or_fetch_silent(basic()).await.unwrap();
        assert!(!metadata.is_placeholder());
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let service = service();
        let store = store(&service);
        let err = store
            .get_table(METADATA_NAME, "public", "ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
