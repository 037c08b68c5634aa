//! Sheet store. The sheet service has no batch endpoint, so composition
//! resolves sheets one get per name.

use std::ops::Deref;
use std::sync::Arc;

use vantage_cache::{ListKey, ListOutcome};
use vantage_core::{
    project_of, ListRequest, Resource, ResourceResult, ResourceService, Sheet, VantageError,
};

use crate::accessor::Accessor;
use crate::context::StoreContext;
use crate::filter::quote;

#[derive(Clone)]
pub struct SheetStore {
    accessor: Accessor<Sheet>,
}

impl SheetStore {
    pub fn new(
        context: &StoreContext,
        service: Arc<dyn ResourceService<Sheet>>,
    ) -> Result<Self, VantageError> {
        Ok(Self {
            accessor: Accessor::new(context, service)?,
        })
    }

    /// List key of the sheets of `project`. Attributes: project.
    pub fn list_key(project: &str) -> ListKey {
        ListKey::new(Sheet::kind().list_namespace()).attr(project)
    }

    pub async fn fetch_project_sheets(&self, project: &str) -> ResourceResult<ListOutcome<Sheet>> {
        let request = ListRequest {
            filter: format!("project == {}", quote(project)),
            ..ListRequest::default()
        };
        self.accessor
            .fetch_list(&Self::list_key(project), request)
            .await
            .map_err(|err| self.accessor.report(project, err))
    }

    /// Cached sheets of `project`, and whether they were listed.
    pub fn project_sheets(&self, project: &str) -> (Vec<Sheet>, bool) {
        (
            self.accessor.list_cached(|s| project_of(&s.name) == project),
            self.accessor.is_list_ready(&Self::list_key(project)),
        )
    }
}

impl Deref for SheetStore {
    type Target = Accessor<Sheet>;

    fn deref(&self) -> &Self::Target {
        &self.accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_test_utils::fixtures::sheet;
    use vantage_test_utils::MockResourceService;

    #[test]
    fn test_list_key_escapes_project_name() {
        assert_eq!(
            SheetStore::list_key("projects/my-shop").as_str(),
            "sheet-projects/my%2Dshop"
        );
    }

    #[tokio::test]
    async fn test_project_sheets() {
        let service = Arc::new(MockResourceService::with_resources(vec![
            sheet("shop", "s1", "ada@example.com"),
            sheet("acme", "s2", "ada@example.com"),
        ]));
        let store = SheetStore::new(&StoreContext::default(), service).unwrap();

        assert!(!store.project_sheets("projects/shop").1);
        store.fetch_project_sheets("projects/shop").await.unwrap();

        let (sheets, ready) = store.project_sheets("projects/shop");
        assert!(ready);
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "projects/shop/sheets/s1");
        assert!(!store.project_sheets("projects/acme").1);
    }
}
