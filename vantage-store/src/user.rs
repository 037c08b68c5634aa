//! User store.

use std::ops::Deref;
use std::sync::Arc;

use vantage_cache::{ListKey, ListOutcome};
use vantage_core::{
    ListRequest, Resource, ResourceResult, ResourceService, ResourceState, User, UserType,
    VantageError,
};

use crate::accessor::Accessor;
use crate::context::StoreContext;

/// Filter over the user list.
///
/// List key attributes, in order: user type, state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub state: Option<ResourceState>,
}

impl UserFilter {
    pub fn list_key(&self) -> ListKey {
        ListKey::new(User::kind().list_namespace())
            .attr(self.user_type.map(user_type_str).unwrap_or_default())
            .attr(self.state.map(|s| s.as_str()).unwrap_or_default())
    }

    pub fn expression(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(user_type) = self.user_type {
            clauses.push(format!("user_type == \"{}\"", user_type_str(user_type)));
        }
        if let Some(state) = self.state {
            clauses.push(format!("state == \"{}\"", state.as_str()));
        }
        clauses.join(" && ")
    }

    pub fn matches(&self, user: &User) -> bool {
        self.user_type.map_or(true, |t| t == user.user_type)
            && self.state.map_or(true, |s| s == user.state)
    }
}

fn user_type_str(user_type: UserType) -> &'static str {
    match user_type {
        UserType::User => "USER",
        UserType::ServiceAccount => "SERVICE_ACCOUNT",
        UserType::SystemBot => "SYSTEM_BOT",
    }
}

/// `users/{email}`.
pub fn user_name(email: &str) -> String {
    format!("users/{}", email)
}

#[derive(Clone)]
pub struct UserStore {
    accessor: Accessor<User>,
}

impl UserStore {
    pub fn new(
        context: &StoreContext,
        service: Arc<dyn ResourceService<User>>,
    ) -> Result<Self, VantageError> {
        Ok(Self {
            accessor: Accessor::new(context, service)?,
        })
    }

    pub async fn get_or_fetch_by_email(&self, email: &str) -> ResourceResult<User> {
        self.accessor.get_or_fetch(&user_name(email)).await
    }

    pub fn get_cached_by_email(&self, email: &str) -> User {
        self.accessor.get_cached(&user_name(email))
    }

    pub async fn fetch_users(&self, filter: &UserFilter) -> ResourceResult<ListOutcome<User>> {
        let request = ListRequest {
            filter: filter.expression(),
            show_deleted: filter.state == Some(ResourceState::Deleted),
            ..ListRequest::default()
        };
        self.accessor
            .fetch_list(&filter.list_key(), request)
            .await
            .map_err(|err| self.accessor.report("users", err))
    }

    pub fn list_cached(&self, filter: &UserFilter) -> (Vec<User>, bool) {
        (
            self.accessor.list_cached(|u| filter.matches(u)),
            self.accessor.is_list_ready(&filter.list_key()),
        )
    }
}

impl Deref for UserStore {
    type Target = Accessor<User>;

    fn deref(&self) -> &Self::Target {
        &self.accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::CacheConfig;
    use vantage_test_utils::fixtures::{user, user_of_type};
    use vantage_test_utils::MockResourceService;

    #[test]
    fn test_filter_list_key() {
        assert_eq!(UserFilter::default().list_key().as_str(), "user");
        let filter = UserFilter {
            user_type: Some(UserType::ServiceAccount),
            state: Some(ResourceState::Active),
        };
        assert_eq!(filter.list_key().as_str(), "user-SERVICE_ACCOUNT-ACTIVE");
        assert_eq!(
            filter.expression(),
            "user_type == \"SERVICE_ACCOUNT\" && state == \"ACTIVE\""
        );
    }

    #[tokio::test]
    async fn test_lookup_by_email() {
        let service = Arc::new(MockResourceService::with_resources(vec![user("ada@example.com")]));
        let store = UserStore::new(&StoreContext::default(), service).unwrap();

        assert!(store.get_cached_by_email("ada@example.com").is_placeholder());
        let ada = store.get_or_fetch_by_email("ada@example.com").await.unwrap();
        assert_eq!(ada.name, "users/ada@example.com");
        assert_eq!(store.get_cached_by_email("ada@example.com"), ada);
    }

    #[tokio::test]
    async fn test_list_by_type() {
        let service = Arc::new(MockResourceService::with_resources(vec![
            user("ada@example.com"),
            user_of_type("ci@service.example.com", UserType::ServiceAccount),
        ]));
        let store = UserStore::new(&StoreContext::new(CacheConfig::default()), service).unwrap();
        let filter = UserFilter {
            user_type: Some(UserType::ServiceAccount),
            state: None,
        };

        store.fetch_users(&UserFilter::default()).await.unwrap();
        let (users, ready) = store.list_cached(&filter);
        assert!(ready);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "ci@service.example.com");
    }
}
