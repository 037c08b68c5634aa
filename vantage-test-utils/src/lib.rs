//! Vantage Test Utilities
//!
//! Shared test infrastructure for the Vantage workspace:
//! - A scriptable mock resource service (call counting, held-open calls,
//!   injected failures)
//! - An in-memory durable store
//! - Proptest generators for resource types
//! - Fixtures for common resources

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

pub use vantage_core::{
    DatabaseMetadata, DurableStore, FieldMask, GetRequest, ListPage, ListRequest,
    PersistenceError, Project, Release, ReleaseFile, Resource, ResourceError, ResourceResult,
    ResourceService, ResourceState, SchemaMetadata, Sheet, TableMetadata, User, View,
};

// ============================================================================
// MOCK RESOURCE SERVICE
// ============================================================================

type Projection<R> = Box<dyn Fn(&R, &GetRequest) -> R + Send + Sync>;

/// In-memory [`ResourceService`] for tests.
///
/// Every call is counted before it waits on the gate, so a test can
/// [`pause`](MockResourceService::pause) the service, issue concurrent reads,
/// check how many calls reached it, then [`resume`](MockResourceService::resume).
pub struct MockResourceService<R> {
    resources: Mutex<BTreeMap<String, R>>,
    deleted: Mutex<BTreeMap<String, R>>,
    scripted_failures: Mutex<VecDeque<ResourceError>>,
    failing_names: Mutex<HashMap<String, ResourceError>>,
    get_requests: Mutex<Vec<GetRequest>>,
    batch_requests: Mutex<Vec<Vec<String>>>,
    projection: Option<Projection<R>>,
    supports_batch: bool,
    gate: watch::Sender<bool>,
    get_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    list_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
}

impl<R: Resource> Default for MockResourceService<R> {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            resources: Mutex::new(BTreeMap::new()),
            deleted: Mutex::new(BTreeMap::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
            failing_names: Mutex::new(HashMap::new()),
            get_requests: Mutex::new(Vec::new()),
            batch_requests: Mutex::new(Vec::new()),
            projection: None,
            supports_batch: false,
            gate,
            get_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
        }
    }
}

impl<R: Resource> MockResourceService<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = R>) -> Self {
        let service = Self::new();
        for resource in resources {
            service.insert(resource);
        }
        service
    }

    /// Report (and serve) a batch endpoint.
    pub fn with_batch_support(mut self, supported: bool) -> Self {
        self.supports_batch = supported;
        self
    }

    /// Shape what `get` returns for a request, e.g. strip fields for BASIC.
    pub fn with_projection<F>(mut self, projection: F) -> Self
    where
        F: Fn(&R, &GetRequest) -> R + Send + Sync + 'static,
    {
        self.projection = Some(Box::new(projection));
        self
    }

    pub fn insert(&self, resource: R) {
        self.resources
            .lock()
            .unwrap()
            .insert(resource.name().to_string(), resource);
    }

    pub fn remove(&self, name: &str) -> Option<R> {
        self.resources.lock().unwrap().remove(name)
    }

    /// Fail the next call, whatever operation it is.
    pub fn fail_next(&self, error: ResourceError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// Fail every `get` of `name`; `batch_get` omits it.
    pub fn fail_name(&self, name: &str, error: ResourceError) {
        self.failing_names
            .lock()
            .unwrap()
            .insert(name.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.scripted_failures.lock().unwrap().clear();
        self.failing_names.lock().unwrap().clear();
    }

    /// Hold every call until [`MockResourceService::resume`].
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// Total calls of every operation.
    pub fn total_calls(&self) -> usize {
        self.get_calls() + self.batch_calls() + self.list_calls() + self.mutation_calls()
    }

    /// Every `get` request received, in order.
    pub fn get_requests(&self) -> Vec<GetRequest> {
        self.get_requests.lock().unwrap().clone()
    }

    /// Names of every `batch_get` call, in order.
    pub fn batch_requests(&self) -> Vec<Vec<String>> {
        self.batch_requests.lock().unwrap().clone()
    }

    async fn enter(&self, counter: &AtomicUsize) -> ResourceResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        match self.scripted_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn name_failure(&self, name: &str) -> Option<ResourceError> {
        self.failing_names.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl<R: Resource> ResourceService<R> for MockResourceService<R> {
    async fn get(&self, request: &GetRequest) -> ResourceResult<R> {
        self.get_requests.lock().unwrap().push(request.clone());
        self.enter(&self.get_calls).await?;
        if let Some(error) = self.name_failure(&request.name) {
            return Err(error);
        }
        let resource = self
            .resources
            .lock()
            .unwrap()
            .get(&request.name)
            .cloned()
            .ok_or_else(|| ResourceError::not_found(request.name.clone()))?;
        Ok(match &self.projection {
            Some(projection) => projection(&resource, request),
            None => resource,
        })
    }

    fn supports_batch_get(&self) -> bool {
        self.supports_batch
    }

    async fn batch_get(&self, names: &[String]) -> ResourceResult<Vec<R>> {
        if !self.supports_batch {
            return Err(ResourceError::Unsupported {
                operation: "batch_get".to_string(),
            });
        }
        self.batch_requests.lock().unwrap().push(names.to_vec());
        self.enter(&self.batch_calls).await?;
        let resources = self.resources.lock().unwrap();
        Ok(names
            .iter()
            .filter(|name| self.name_failure(name).is_none())
            .filter_map(|name| resources.get(name).cloned())
            .collect())
    }

    async fn list(&self, request: &ListRequest) -> ResourceResult<ListPage<R>> {
        self.enter(&self.list_calls).await?;
        let offset: usize = if request.page_token.is_empty() {
            0
        } else {
            request
                .page_token
                .parse()
                .map_err(|_| ResourceError::Malformed {
                    name: "page_token".to_string(),
                    reason: format!("invalid page token {:?}", request.page_token),
                })?
        };
        let page_size = if request.page_size > 0 {
            request.page_size as usize
        } else {
            usize::MAX
        };

        let mut all: Vec<R> = self.resources.lock().unwrap().values().cloned().collect();
        if request.show_deleted {
            all.extend(self.deleted.lock().unwrap().values().cloned());
        }
        let end = offset.saturating_add(page_size).min(all.len());
        let resources = all.get(offset..end).map(<[R]>::to_vec).unwrap_or_default();
        let next_page_token = if end < all.len() {
            end.to_string()
        } else {
            String::new()
        };
        Ok(ListPage {
            resources,
            next_page_token,
        })
    }

    async fn update(&self, resource: &R, _field_mask: &FieldMask) -> ResourceResult<R> {
        self.enter(&self.mutation_calls).await?;
        let mut resources = self.resources.lock().unwrap();
        match resources.get_mut(resource.name()) {
            Some(stored) => {
                *stored = resource.clone();
                Ok(resource.clone())
            }
            None => Err(ResourceError::not_found(resource.name())),
        }
    }

    async fn delete(&self, name: &str) -> ResourceResult<()> {
        self.enter(&self.mutation_calls).await?;
        let removed = self
            .resources
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        self.deleted.lock().unwrap().insert(name.to_string(), removed);
        Ok(())
    }

    async fn undelete(&self, name: &str) -> ResourceResult<R> {
        self.enter(&self.mutation_calls).await?;
        let restored = self
            .deleted
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        self.insert(restored.clone());
        Ok(restored)
    }
}

// ============================================================================
// IN-MEMORY DURABLE STORE
// ============================================================================

/// [`DurableStore`] kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    values: Mutex<HashMap<String, Value>>,
    save_calls: AtomicUsize,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl DurableStore for InMemoryDurableStore {
    fn load(&self, key: &str, default: Value) -> Result<Value, PersistenceError> {
        Ok(self.get(key).unwrap_or(default))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use vantage_core::{ColumnMetadata, UserType};

    pub fn arb_resource_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,7}"
    }

    pub fn arb_project() -> impl Strategy<Value = Project> {
        (arb_resource_id(), "[A-Za-z ]{1,12}", any::<bool>()).prop_map(|(id, title, deleted)| {
            Project {
                name: format!("projects/{}", id),
                uid: id.clone(),
                title,
                key: id.to_uppercase(),
                state: if deleted {
                    ResourceState::Deleted
                } else {
                    ResourceState::Active
                },
            }
        })
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (arb_resource_id(), prop::sample::select(vec![
            UserType::User,
            UserType::ServiceAccount,
            UserType::SystemBot,
        ]))
        .prop_map(|(id, user_type)| fixtures::user_of_type(&format!("{}@example.com", id), user_type))
    }

    pub fn arb_column() -> impl Strategy<Value = ColumnMetadata> {
        ("[a-z]{1,4}", 1..20i32, any::<bool>()).prop_map(|(name, position, nullable)| {
            ColumnMetadata {
                name,
                position,
                column_type: "int".to_string(),
                nullable,
                default: None,
            }
        })
    }

    pub fn arb_table() -> impl Strategy<Value = TableMetadata> {
        ("[a-e]", prop::collection::vec(arb_column(), 0..4)).prop_map(|(name, columns)| {
            TableMetadata {
                name,
                columns,
                engine: String::new(),
                comment: String::new(),
                row_count: 0,
            }
        })
    }

    pub fn arb_schema() -> impl Strategy<Value = SchemaMetadata> {
        ("[a-c]", prop::collection::vec(arb_table(), 0..4)).prop_map(|(name, tables)| {
            SchemaMetadata {
                name,
                tables,
                views: Vec::new(),
            }
        })
    }

    pub fn arb_database_metadata() -> impl Strategy<Value = DatabaseMetadata> {
        prop::collection::vec(arb_schema(), 0..4).prop_map(|schemas| DatabaseMetadata {
            name: fixtures::METADATA_NAME.to_string(),
            character_set: "utf8mb4".to_string(),
            collation: "utf8mb4_general_ci".to_string(),
            schemas,
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vantage_core::{ColumnMetadata, UserType};

    /// Metadata name used by database metadata fixtures.
    pub const METADATA_NAME: &str = "instances/prod/databases/shop/metadata";

    /// `projects/{id}` with the given title.
    pub fn project(id: &str, title: &str) -> Project {
        Project {
            name: format!("projects/{}", id),
            uid: format!("uid-{}", id),
            title: title.to_string(),
            key: id.to_uppercase(),
            state: ResourceState::Active,
        }
    }

    /// `users/{email}`.
    pub fn user(email: &str) -> User {
        user_of_type(email, UserType::User)
    }

    pub fn user_of_type(email: &str, user_type: UserType) -> User {
        User {
            name: format!("users/{}", email),
            uid: format!("uid-{}", email),
            email: email.to_string(),
            title: email.split('@').next().unwrap_or(email).to_string(),
            user_type,
            state: ResourceState::Active,
        }
    }

    /// `projects/{project}/sheets/{id}` created by `users/{creator}`.
    pub fn sheet(project: &str, id: &str, creator: &str) -> Sheet {
        let content = format!("SELECT {};", id);
        Sheet {
            name: format!("projects/{}/sheets/{}", project, id),
            uid: format!("uid-{}", id),
            title: id.to_string(),
            creator: format!("users/{}", creator),
            content_size: content.len() as i64,
            content,
        }
    }

    /// `projects/{project}/releases/{id}` with one file per sheet id.
    pub fn release(project: &str, id: &str, creator: &str, sheets: &[&str]) -> Release {
        Release {
            name: format!("projects/{}/releases/{}", project, id),
            uid: format!("uid-{}", id),
            title: format!("Release {}", id),
            creator: format!("users/{}", creator),
            files: sheets
                .iter()
                .enumerate()
                .map(|(i, sheet)| ReleaseFile {
                    filename: format!("{:04}_{}.sql", i + 1, sheet),
                    sheet: format!("projects/{}/sheets/{}", project, sheet),
                    sheet_sha1: String::new(),
                    version: format!("{}", i + 1),
                })
                .collect(),
            create_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            state: ResourceState::Active,
        }
    }

    pub fn table(name: &str, columns: &[&str]) -> TableMetadata {
        TableMetadata {
            name: name.to_string(),
            columns: columns
                .iter()
                .enumerate()
                .map(|(i, column)| ColumnMetadata {
                    name: column.to_string(),
                    position: i as i32 + 1,
                    column_type: "text".to_string(),
                    nullable: true,
                    default: None,
                })
                .collect(),
            engine: "InnoDB".to_string(),
            comment: String::new(),
            row_count: 0,
        }
    }

    pub fn schema(name: &str, tables: Vec<TableMetadata>) -> SchemaMetadata {
        SchemaMetadata {
            name: name.to_string(),
            tables,
            views: Vec::new(),
        }
    }

    pub fn database_metadata(schemas: Vec<SchemaMetadata>) -> DatabaseMetadata {
        DatabaseMetadata {
            name: METADATA_NAME.to_string(),
            character_set: "utf8mb4".to_string(),
            collation: "utf8mb4_general_ci".to_string(),
            schemas,
        }
    }

    /// The BASIC projection of database metadata: column lists stripped, and
    /// restricted to the requested slice if any.
    pub fn project_metadata(metadata: &DatabaseMetadata, request: &GetRequest) -> DatabaseMetadata {
        let mut projected = metadata.clone();
        if let Some(slice) = &request.slice {
            projected.schemas.retain(|s| s.name == slice.schema);
            if let Some(table) = &slice.table {
                for schema in &mut projected.schemas {
                    schema.tables.retain(|t| &t.name == table);
                    schema.views.clear();
                }
            }
        }
        if request.view == View::Basic {
            for schema in &mut projected.schemas {
                for table in &mut schema.tables {
                    table.columns.clear();
                }
            }
        }
        projected
    }
}
