//! Scenario Tests for the Resource Stores
//!
//! Drive the stores through a shared [`StoreContext`] against mock services
//! and check what the remote side saw: how many calls, and which requests.

use std::sync::Arc;
use std::time::Duration;

use vantage_cache::{CacheKey, ListKey};
use vantage_core::{
    CacheConfig, DatabaseMetadata, GetRequest, Project, Release, Resource, ResourceError, Sheet,
    User, View,
};
use vantage_store::{
    DatabaseMetadataStore, NotificationLevel, ProjectFilter, ProjectStore, RecordingNotifier,
    ReleaseStore, StoreContext, UserFilter, UserStore,
};
use vantage_test_utils::fixtures::{
    database_metadata, project, project_metadata, release, schema, sheet, table, user,
    METADATA_NAME,
};
use vantage_test_utils::MockResourceService;

// ============================================================================
// HELPERS
// ============================================================================

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn acme_service() -> Arc<MockResourceService<Project>> {
    Arc::new(MockResourceService::with_resources(vec![project("acme", "Acme")]))
}

// ============================================================================
// ENTITY CACHE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_project_fetch_coalesce_invalidate() {
    let service = acme_service();
    let context = StoreContext::default();
    let store = ProjectStore::new(&context, service.clone()).unwrap();
    assert!(store.peek("projects/acme").is_none());

    service.pause();
    let first = tokio::spawn({
        let store = store.clone();
        async move { store.get_or_fetch("projects/acme").await }
    });
    wait_until(|| service.get_calls() == 1).await;
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.get_or_fetch("projects/acme").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.resume();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.name, "projects/acme");
    assert_eq!(first.title, "Acme");
    assert_eq!(first, second);
    assert_eq!(service.get_calls(), 1);
    assert_eq!(store.peek("projects/acme"), Some(first.clone()));

    store.get_or_fetch("projects/acme").await.unwrap();
    assert_eq!(service.get_calls(), 1);

    store.invalidate("projects/acme");
    assert!(store.peek("projects/acme").is_none());
    assert_eq!(store.get_or_fetch("projects/acme").await.unwrap(), first);
    assert_eq!(service.get_calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_coalesced_failure_reaches_every_caller() {
    let service = acme_service();
    let store = ProjectStore::new(&StoreContext::default(), service.clone()).unwrap();
    service.fail_next(ResourceError::unavailable("connection reset"));
    service.pause();

    let callers: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_fetch_silent("projects/acme").await })
        })
        .collect();
    wait_until(|| service.get_calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.resume();

    for caller in callers {
        let err = caller.await.unwrap().unwrap_err();
        assert_eq!(err, ResourceError::unavailable("connection reset"));
    }
    assert_eq!(service.get_calls(), 1);
    assert!(store.peek("projects/acme").is_none());
}

#[tokio::test]
async fn test_retry_after_failure_and_notification() {
    let service = acme_service();
    let notifier = Arc::new(RecordingNotifier::new());
    let context = StoreContext::default().with_notifier(notifier.clone());
    let store = ProjectStore::new(&context, service.clone()).unwrap();

    service.fail_next(ResourceError::unavailable("timeout"));
    assert!(store.get_or_fetch("projects/acme").await.is_err());
    assert_eq!(notifier.len(), 1);
    assert_eq!(notifier.drain()[0].level, NotificationLevel::Error);

    let acme = store.get_or_fetch("projects/acme").await.unwrap();
    assert_eq!(acme.title, "Acme");
    assert_eq!(service.get_calls(), 2);
    assert!(notifier.is_empty());
}

#[tokio::test]
async fn test_missing_project_is_not_reported() {
    let service = acme_service();
    let notifier = Arc::new(RecordingNotifier::new());
    let context = StoreContext::default().with_notifier(notifier.clone());
    let store = ProjectStore::new(&context, service).unwrap();

    let err = store.get_or_fetch("projects/ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(notifier.is_empty());
    assert!(store.get_cached("projects/ghost").is_placeholder());
}

#[tokio::test]
async fn test_clear_all_drops_every_store() {
    let projects = acme_service();
    let users = Arc::new(MockResourceService::with_resources(vec![user("ada@example.com")]));
    let context = StoreContext::default();
    let project_store = ProjectStore::new(&context, projects.clone()).unwrap();
    let user_store = UserStore::new(&context, users.clone()).unwrap();

    project_store.get_or_fetch("projects/acme").await.unwrap();
    user_store.get_or_fetch_by_email("ada@example.com").await.unwrap();
    user_store.fetch_users(&UserFilter::default()).await.unwrap();

    context.clear_all();
    assert!(project_store.peek("projects/acme").is_none());
    assert!(user_store.get_cached_by_email("ada@example.com").is_placeholder());
    assert!(!user_store.list_cached(&UserFilter::default()).1);

    project_store.get_or_fetch("projects/acme").await.unwrap();
    assert_eq!(projects.get_calls(), 2);
}

// ============================================================================
// LIST CACHE
// ============================================================================

#[tokio::test]
async fn test_list_markers_fall_back_to_broader_filters() {
    let context = StoreContext::default();
    let lists = context.registry().lists();
    let ns = ListKey::new("ns");
    let active = ns.clone().attr("active");
    for key in [&ns, &active] {
        assert!(lists.mark_fetching(key));
        lists.mark_settled(key);
    }

    let (hit, _) = lists.get_cache(&active.clone().attr("region1")).unwrap();
    assert_eq!(hit, active);
    let (hit, _) = lists.get_cache(&ns.clone().attr("other")).unwrap();
    assert_eq!(hit, ns);
    assert!(lists.get_cache(&ListKey::new("other")).is_none());
}

#[tokio::test]
async fn test_project_list_readiness_and_mutation() {
    let service = Arc::new(MockResourceService::with_resources(vec![
        project("acme", "Acme"),
        project("shop", "Shop"),
    ]));
    let store = ProjectStore::new(&StoreContext::default(), service.clone()).unwrap();
    let narrow = ProjectFilter::active().with_query("ac");

    assert!(!store.list_cached(&narrow).1);
    store.fetch_projects(&ProjectFilter::default()).await.unwrap();

    // A narrower filter is answered by the broader list.
    let (projects, ready) = store.list_cached(&narrow);
    assert!(ready);
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "projects/acme");
    assert_eq!(service.list_calls(), 1);

    store.delete("projects/shop").await.unwrap();
    assert!(store.peek("projects/shop").is_none());
    assert!(!store.list_cached(&ProjectFilter::default()).1);

    let restored = store.undelete("projects/shop").await.unwrap();
    assert_eq!(store.peek("projects/shop"), Some(restored));
}

// ============================================================================
// VIEW SUPERSESSION
// ============================================================================

fn metadata_service() -> Arc<MockResourceService<DatabaseMetadata>> {
    let metadata = database_metadata(vec![schema(
        "public",
        vec![table("orders", &["id", "total"]), table("users", &["id"])],
    )]);
    Arc::new(MockResourceService::with_resources(vec![metadata]).with_projection(project_metadata))
}

fn viewed_entries(context: &StoreContext) -> Vec<CacheKey> {
    context
        .registry()
        .namespace::<CacheKey, DatabaseMetadata>(DatabaseMetadata::kind().namespace())
        .unwrap()
        .keys()
}

#[tokio::test]
async fn test_full_supersedes_basic() {
    let service = metadata_service();
    let context = StoreContext::default();
    let store = DatabaseMetadataStore::new(&context, service.clone()).unwrap();

    store
        .get_or_fetch(GetRequest::new(METADATA_NAME).with_view(View::Basic))
        .await
        .unwrap();
    store.get_or_fetch(GetRequest::new(METADATA_NAME)).await.unwrap();

    assert_eq!(
        viewed_entries(&context),
        vec![CacheKey::for_view(METADATA_NAME, View::Full).unwrap()]
    );
    let cached = store.get_cached(METADATA_NAME);
    assert_eq!(cached.table("public", "orders").unwrap().columns.len(), 2);
}

#[tokio::test]
async fn test_basic_never_downgrades_full() {
    let service = metadata_service();
    let context = StoreContext::default();
    let store = DatabaseMetadataStore::new(&context, service.clone()).unwrap();

    let full = store.get_or_fetch(GetRequest::new(METADATA_NAME)).await.unwrap();
    let basic = store
        .get_or_fetch(GetRequest::new(METADATA_NAME).with_view(View::Basic))
        .await
        .unwrap();

    assert_eq!(basic, full);
    assert_eq!(service.get_calls(), 1);
    assert_eq!(store.cached_view(METADATA_NAME), Some(View::Full));
    assert_eq!(viewed_entries(&context).len(), 1);
}

// ============================================================================
// COMPOSITION
// ============================================================================

struct Releases {
    sheets: Arc<MockResourceService<Sheet>>,
    users: Arc<MockResourceService<User>>,
    notifier: Arc<RecordingNotifier>,
    store: ReleaseStore,
}

fn releases(config: CacheConfig) -> Releases {
    let release_service = Arc::new(MockResourceService::<Release>::with_resources(vec![
        release("shop", "r1", "ada@example.com", &["s1", "s2"]),
        release("shop", "r2", "ada@example.com", &["s3"]),
    ]));
    let projects = Arc::new(
        MockResourceService::with_resources(vec![project("shop", "Shop")]).with_batch_support(true),
    );
    let users = Arc::new(
        MockResourceService::with_resources(vec![user("ada@example.com")]).with_batch_support(true),
    );
    let sheets = Arc::new(MockResourceService::with_resources(vec![
        sheet("shop", "s1", "ada@example.com"),
        sheet("shop", "s2", "ada@example.com"),
        sheet("shop", "s3", "ada@example.com"),
    ]));
    let notifier = Arc::new(RecordingNotifier::new());
    let context = StoreContext::new(config).with_notifier(notifier.clone());
    let store = ReleaseStore::new(
        &context,
        release_service,
        projects,
        users.clone(),
        sheets.clone(),
    )
    .unwrap();
    Releases {
        sheets,
        users,
        notifier,
        store,
    }
}

#[tokio::test]
async fn test_composition_degrades_to_placeholders() {
    let fixture = releases(CacheConfig::default().with_silent_composition(false));
    fixture.sheets.fail_name(
        "projects/shop/sheets/s2",
        ResourceError::not_found("projects/shop/sheets/s2"),
    );

    let composed = fixture
        .store
        .fetch_project_releases("projects/shop")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(composed.len(), 2);

    let r1 = composed.iter().find(|c| c.name().ends_with("/r1")).unwrap();
    assert_eq!(r1.project.title, "Shop");
    assert_eq!(r1.creator.email, "ada@example.com");
    assert!(!r1.files[0].sheet.is_placeholder());
    assert!(r1.files[1].sheet.is_placeholder());
    assert_eq!(r1.files[1].sheet.name, "projects/shop/sheets/s2");
    assert!(!r1.is_fully_resolved());

    let r2 = composed.iter().find(|c| c.name().ends_with("/r2")).unwrap();
    assert!(r2.is_fully_resolved());

    // One creator referenced by both releases, resolved in one batch.
    assert_eq!(fixture.users.batch_calls(), 1);
    assert_eq!(fixture.users.get_calls(), 0);

    let warnings = fixture.notifier.drain();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level, NotificationLevel::Warning);
}

#[tokio::test]
async fn test_failed_reference_is_retried_on_next_composition() {
    let fixture = releases(CacheConfig::default());
    fixture.sheets.fail_name(
        "projects/shop/sheets/s2",
        ResourceError::unavailable("sheet service down"),
    );
    let first = fixture
        .store
        .get_or_fetch("projects/shop/releases/r1")
        .await
        .unwrap();
    assert!(!first.is_fully_resolved());
    assert!(fixture.notifier.is_empty());

    fixture.sheets.clear_failures();
    let second = fixture
        .store
        .get_or_fetch("projects/shop/releases/r1")
        .await
        .unwrap();
    assert!(second.is_fully_resolved());
    assert_eq!(second.files[1].sheet.title, "s2");

    // Cached composition: no further sheet traffic.
    let calls = fixture.sheets.get_calls();
    let third = fixture
        .store
        .get_or_fetch("projects/shop/releases/r1")
        .await
        .unwrap();
    assert_eq!(third, second);
    assert_eq!(fixture.sheets.get_calls(), calls);
}
