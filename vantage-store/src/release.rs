//! Release store with composition.
//!
//! A release references its owning project, its creator and one sheet per
//! file. [`ReleaseStore`] resolves those references for a whole batch of
//! releases at once and caches fully resolved compositions by release name.
//! A cached composition is only handed out while the release and every
//! reference it holds still match their own caches.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vantage_cache::{
    Composer, ListKey, ListOutcome, NamespaceCache, ReferenceCollector, ResourceStore,
};
use vantage_core::{
    FieldMask, ListRequest, Project, Release, ReleaseFile, Resource, ResourceError, ResourceResult,
    ResourceService, Sheet, User, VantageError,
};

use crate::accessor::Accessor;
use crate::context::StoreContext;
use crate::filter::quote;
use crate::notifications::Notification;

/// Namespace of composed releases.
pub const COMPOSED_RELEASE_NAMESPACE: &str = "composed-release-by-name";

/// A release file with its sheet attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReleaseFile {
    pub file: ReleaseFile,
    pub sheet: Sheet,
}

/// A release with its references resolved. Unresolved references hold
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedRelease {
    pub release: Release,
    pub project: Project,
    pub creator: User,
    pub files: Vec<ComposedReleaseFile>,
}

impl ComposedRelease {
    pub fn name(&self) -> &str {
        &self.release.name
    }

    /// Whether every reference resolved to a real resource.
    pub fn is_fully_resolved(&self) -> bool {
        !self.project.is_placeholder()
            && !self.creator.is_placeholder()
            && self.files.iter().all(|f| !f.sheet.is_placeholder())
    }
}

#[derive(Clone)]
pub struct ReleaseStore {
    releases: Accessor<Release>,
    composed: Arc<NamespaceCache<String, ComposedRelease>>,
    projects: ResourceStore<Project>,
    users: ResourceStore<User>,
    sheets: ResourceStore<Sheet>,
    context: StoreContext,
}

impl ReleaseStore {
    /// The project, user and sheet stores share the context's namespaces,
    /// so references resolved here are visible to every other store.
    pub fn new(
        context: &StoreContext,
        releases: Arc<dyn ResourceService<Release>>,
        projects: Arc<dyn ResourceService<Project>>,
        users: Arc<dyn ResourceService<User>>,
        sheets: Arc<dyn ResourceService<Sheet>>,
    ) -> Result<Self, VantageError> {
        let registry = context.registry();
        let config = context.config().clone();
        Ok(Self {
            releases: Accessor::new(context, releases)?,
            composed: registry.namespace(COMPOSED_RELEASE_NAMESPACE)?,
            projects: ResourceStore::new(registry, projects, config.clone())?,
            users: ResourceStore::new(registry, users, config.clone())?,
            sheets: ResourceStore::new(registry, sheets, config)?,
            context: context.clone(),
        })
    }

    pub fn releases(&self) -> &Accessor<Release> {
        &self.releases
    }

    /// List key of the releases of `project`. Attributes: project.
    pub fn list_key(project: &str) -> ListKey {
        ListKey::new(Release::kind().list_namespace()).attr(project)
    }

    /// Fetch a release and compose it.
    pub async fn get_or_fetch(&self, name: &str) -> ResourceResult<ComposedRelease> {
        if let Some(composed) = self.fresh_composition(name) {
            return Ok(composed);
        }
        let release = self.releases.get_or_fetch(name).await?;
        let mut composed = self.compose(vec![release]).await;
        // One release in, one out.
        composed
            .pop()
            .ok_or_else(|| ResourceError::not_found(name))
    }

    /// Composed release if cached, else a composition of whatever is cached,
    /// with placeholders for the rest. Never fetches.
    pub fn get_cached(&self, name: &str) -> ComposedRelease {
        if let Some(composed) = self.fresh_composition(name) {
            return composed;
        }
        let release = self.releases.get_cached(name);
        ComposedRelease {
            project: self.projects.get_cached(&release.project_name()),
            creator: self.users.get_cached(&release.creator),
            files: release
                .files
                .iter()
                .map(|file| ComposedReleaseFile {
                    file: file.clone(),
                    sheet: self.sheets.get_cached(&file.sheet),
                })
                .collect(),
            release,
        }
    }

    /// Fetch every release of `project` and compose them, in list order.
    pub async fn fetch_project_releases(
        &self,
        project: &str,
    ) -> ResourceResult<Option<Vec<ComposedRelease>>> {
        let request = ListRequest {
            filter: format!("project == {}", quote(project)),
            ..ListRequest::default()
        };
        let outcome = self
            .releases
            .fetch_list(&Self::list_key(project), request)
            .await
            .map_err(|err| self.releases.report(project, err))?;
        match outcome {
            ListOutcome::Fetched(releases) => Ok(Some(self.compose(releases).await)),
            ListOutcome::AlreadyFetching => Ok(None),
        }
    }

    /// Cached composed releases of `project`, and whether they were listed.
    pub fn project_releases(&self, project: &str) -> (Vec<ComposedRelease>, bool) {
        let releases = self
            .releases
            .list_cached(|r| r.project_name() == project)
            .into_iter()
            .map(|r| self.get_cached(&r.name))
            .collect();
        (releases, self.releases.is_list_ready(&Self::list_key(project)))
    }

    /// Drop the release and its composition.
    pub fn invalidate(&self, name: &str) {
        self.releases.invalidate(name);
        self.composed.invalidate_entity(&name.to_string());
    }

    pub async fn update(
        &self,
        release: &Release,
        field_mask: &FieldMask,
    ) -> ResourceResult<Release> {
        let updated = self.releases.update(release, field_mask).await?;
        self.composed.invalidate_entity(&updated.name);
        Ok(updated)
    }

    pub async fn delete(&self, name: &str) -> ResourceResult<()> {
        self.releases.delete(name).await?;
        self.composed.invalidate_entity(&name.to_string());
        Ok(())
    }

    pub async fn undelete(&self, name: &str) -> ResourceResult<Release> {
        let restored = self.releases.undelete(name).await?;
        self.composed.invalidate_entity(&restored.name);
        Ok(restored)
    }

    /// The cached composition of `name`, if its release and references are
    /// unchanged since it was composed. A stale one is dropped.
    fn fresh_composition(&self, name: &str) -> Option<ComposedRelease> {
        let key = name.to_string();
        let composed = self.composed.get_entity(&key)?;
        let fresh = self.releases.peek(name).as_ref() == Some(&composed.release)
            && self.projects.peek(&composed.project.name).as_ref() == Some(&composed.project)
            && self.users.peek(&composed.creator.name).as_ref() == Some(&composed.creator)
            && composed
                .files
                .iter()
                .all(|f| self.sheets.peek(&f.sheet.name).as_ref() == Some(&f.sheet));
        if fresh {
            Some(composed)
        } else {
            debug!(name = %name, "composed release is stale, recomposing");
            self.composed.invalidate_entity(&key);
            None
        }
    }

    fn report_unresolved(&self, kind: &str, names: &[&str]) {
        if names.is_empty() {
            return;
        }
        warn!(kind, count = names.len(), "release references unresolved");
        if !self.context.config().silent_composition {
            self.context.notify(Notification::warning(format!(
                "Could not resolve {} {}",
                kind,
                names.join(", ")
            )));
        }
    }
}

#[async_trait]
impl Composer for ReleaseStore {
    type Base = Release;
    type Composed = ComposedRelease;

    async fn compose(&self, batch: Vec<Release>) -> Vec<ComposedRelease> {
        let mut project_names = ReferenceCollector::new();
        let mut creator_names = ReferenceCollector::new();
        let mut sheet_names = ReferenceCollector::new();
        for release in &batch {
            project_names.add(release.project_name());
            creator_names.add(release.creator.clone());
            sheet_names.extend(release.files.iter().map(|f| f.sheet.clone()));
        }
        debug!(
            releases = batch.len(),
            projects = project_names.len(),
            creators = creator_names.len(),
            sheets = sheet_names.len(),
            "composing releases"
        );

        let (projects, creators, sheets) = tokio::join!(
            self.projects.resolve_many(project_names.into_names()),
            self.users.resolve_many(creator_names.into_names()),
            self.sheets.resolve_many(sheet_names.into_names()),
        );
        self.report_unresolved("projects", &projects.failed_names());
        self.report_unresolved("users", &creators.failed_names());
        self.report_unresolved("sheets", &sheets.failed_names());

        batch
            .into_iter()
            .map(|release| {
                let composed = ComposedRelease {
                    project: projects.get(&release.project_name()),
                    creator: creators.get(&release.creator),
                    files: release
                        .files
                        .iter()
                        .map(|file| ComposedReleaseFile {
                            file: file.clone(),
                            sheet: sheets.get(&file.sheet),
                        })
                        .collect(),
                    release,
                };
                // Placeholders are retried on the next composition.
                if composed.is_fully_resolved() {
                    self.composed
                        .set_entity(composed.name().to_string(), composed.clone());
                }
                composed
            })
            .collect()
    }
}
