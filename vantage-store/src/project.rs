//! Project store.

use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info};
use vantage_cache::{ListKey, ListOutcome};
use vantage_core::{
    DurableStore, DurableStoreExt, ListRequest, PersistenceError, Project, Resource,
    ResourceResult, ResourceService, ResourceState, VantageError,
};

use crate::accessor::Accessor;
use crate::context::StoreContext;
use crate::filter::quote;

/// Durable key of the recently visited projects.
pub const RECENT_PROJECTS_KEY: &str = "vantage.recent-projects";

/// How many recently visited projects are remembered.
pub const MAX_RECENT_PROJECTS: usize = 5;

/// Filter over the project list.
///
/// List key attributes, in order: state, query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub state: Option<ResourceState>,
    /// Case-insensitive match on title or id.
    pub query: String,
}

impl ProjectFilter {
    pub fn active() -> Self {
        Self {
            state: Some(ResourceState::Active),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn list_key(&self) -> ListKey {
        ListKey::new(Project::kind().list_namespace())
            .attr(self.state.map(|s| s.as_str()).unwrap_or_default())
            .attr(self.query.trim().to_lowercase())
    }

    /// Service-side filter expression.
    pub fn expression(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(state) = self.state {
            clauses.push(format!("state == \"{}\"", state.as_str()));
        }
        let query = self.query.trim();
        if !query.is_empty() {
            clauses.push(format!(
                "(name.matches({q}) || resource_id.matches({q}))",
                q = quote(&query.to_lowercase())
            ));
        }
        clauses.join(" && ")
    }

    pub fn matches(&self, project: &Project) -> bool {
        if self.state.is_some_and(|state| state != project.state) {
            return false;
        }
        let query = self.query.trim().to_lowercase();
        query.is_empty()
            || project.title.to_lowercase().contains(&query)
            || project.resource_id().to_lowercase().contains(&query)
    }
}

#[derive(Clone)]
pub struct ProjectStore {
    accessor: Accessor<Project>,
}

impl ProjectStore {
    pub fn new(
        context: &StoreContext,
        service: Arc<dyn ResourceService<Project>>,
    ) -> Result<Self, VantageError> {
        Ok(Self {
            accessor: Accessor::new(context, service)?,
        })
    }

    /// Fetch every page of projects matching `filter`.
    pub async fn fetch_projects(&self, filter: &ProjectFilter) -> ResourceResult<ListOutcome<Project>> {
        let request = ListRequest {
            filter: filter.expression(),
            show_deleted: filter.state == Some(ResourceState::Deleted),
            ..ListRequest::default()
        };
        self.accessor
            .fetch_list(&filter.list_key(), request)
            .await
            .map_err(|err| self.accessor.report("projects", err))
    }

    /// Cached projects matching `filter`, and whether a settled list fetch
    /// covers it.
    pub fn list_cached(&self, filter: &ProjectFilter) -> (Vec<Project>, bool) {
        (
            self.accessor.list_cached(|p| filter.matches(p)),
            self.accessor.is_list_ready(&filter.list_key()),
        )
    }

    /// Load the recently visited projects from `durable` into the cache.
    /// Returns how many were seeded.
    pub fn seed_recent(&self, durable: &dyn DurableStore) -> Result<usize, PersistenceError> {
        let recent: Vec<Project> = durable.load_typed(RECENT_PROJECTS_KEY, Vec::new())?;
        let mut seeded = 0;
        for project in recent {
            if project.is_placeholder() || self.accessor.peek(&project.name).is_some() {
                continue;
            }
            self.accessor.set(project);
            seeded += 1;
        }
        info!(seeded, "recent projects seeded");
        Ok(seeded)
    }

    /// Record `project` as most recently visited.
    pub fn remember_recent(
        &self,
        durable: &dyn DurableStore,
        project: &Project,
    ) -> Result<(), PersistenceError> {
        if project.is_placeholder() {
            return Ok(());
        }
        let mut recent: Vec<Project> = durable.load_typed(RECENT_PROJECTS_KEY, Vec::new())?;
        recent.retain(|p| p.name != project.name);
        recent.insert(0, project.clone());
        recent.truncate(MAX_RECENT_PROJECTS);
        debug!(project = %project.name, count = recent.len(), "recent project remembered");
        durable.save_typed(RECENT_PROJECTS_KEY, &recent)
    }

    /// Names of the recently visited projects, most recent first.
    pub fn recent_projects(&self, durable: &dyn DurableStore) -> Result<Vec<String>, PersistenceError> {
        let recent: Vec<Project> = durable.load_typed(RECENT_PROJECTS_KEY, Vec::new())?;
        Ok(recent.into_iter().map(|p| p.name).collect())
    }
}

impl Deref for ProjectStore {
    type Target = Accessor<Project>;

    fn deref(&self) -> &Self::Target {
        &self.accessor
    }
}
