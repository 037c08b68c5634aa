//! Building blocks of the composition pipeline.
//!
//! A composer collects the names a batch of base resources references,
//! resolves each referenced kind through its [`ResourceStore`], and attaches
//! the results. Resolution never fails a batch: a reference that could not
//! be resolved is replaced by the kind's placeholder.
//!
//! [`ResourceStore`]: crate::accessor::ResourceStore

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use vantage_core::{is_unresolvable_name, unknown_name, Resource, ResourceError};

/// Deduplicated, ordered set of referenced names of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceCollector {
    names: BTreeSet<String>,
}

impl ReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_names(self) -> Vec<String> {
        self.names.into_iter().collect()
    }
}

impl<S: Into<String>> Extend<S> for ReferenceCollector {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.add(name);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ReferenceCollector {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut collector = Self::new();
        collector.extend(iter);
        collector
    }
}

/// Outcome of resolving a set of references of one kind.
#[derive(Debug, Clone)]
pub struct ResolvedReferences<R> {
    resolved: HashMap<String, R>,
    failed: HashMap<String, ResourceError>,
}

impl<R> Default for ResolvedReferences<R> {
    fn default() -> Self {
        Self {
            resolved: HashMap::new(),
            failed: HashMap::new(),
        }
    }
}

impl<R: Resource> ResolvedReferences<R> {
    pub(crate) fn insert(&mut self, name: String, resource: R) {
        self.resolved.insert(name, resource);
    }

    pub(crate) fn insert_failure(&mut self, name: String, error: ResourceError) {
        self.failed.insert(name, error);
    }

    /// The resolved resource for `name`, or its placeholder.
    pub fn get(&self, name: &str) -> R {
        if let Some(resource) = self.resolved.get(name) {
            return resource.clone();
        }
        if name.trim().is_empty() {
            R::unknown(&unknown_name(R::kind()))
        } else {
            R::unknown(name)
        }
    }

    /// The resolved resource for `name`, with no placeholder fallback.
    pub fn try_get(&self, name: &str) -> Option<&R> {
        self.resolved.get(name)
    }

    /// Why `name` failed to resolve, if it did.
    pub fn failure(&self, name: &str) -> Option<&ResourceError> {
        self.failed.get(name)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Names that failed to resolve, sorted.
    pub fn failed_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.failed.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Whether a referenced name is worth resolving at all.
pub fn is_resolvable(name: &str) -> bool {
    !is_unresolvable_name(name)
}

/// Turns a batch of base resources into composed resources.
///
/// Output order matches input order, and composition is infallible: a failed
/// reference degrades to a placeholder.
#[async_trait]
pub trait Composer: Send + Sync {
    type Base: Send + 'static;
    type Composed: Send + 'static;

    async fn compose(&self, batch: Vec<Self::Base>) -> Vec<Self::Composed>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::{Project, UNKNOWN_ID};

    #[test]
    fn test_collector_deduplicates_and_orders() {
        let collector: ReferenceCollector =
            ["users/b", "users/a", "users/b"].into_iter().collect();
        assert_eq!(collector.len(), 2);
        assert_eq!(
            collector.into_names(),
            vec!["users/a".to_string(), "users/b".to_string()]
        );
    }

    #[test]
    fn test_resolved_references_fall_back_to_placeholder() {
        let mut refs = ResolvedReferences::<Project>::default();
        refs.insert("projects/acme".to_string(), Project::unknown("projects/acme"));
        refs.insert_failure("projects/gone".to_string(), ResourceError::not_found("projects/gone"));

        assert!(refs.try_get("projects/acme").is_some());
        let gone = refs.get("projects/gone");
        assert_eq!(gone.name, "projects/gone");
        assert!(gone.is_placeholder());
        assert_eq!(refs.failed_names(), vec!["projects/gone"]);

        let empty = refs.get("");
        assert_eq!(empty.name, format!("projects/{}", UNKNOWN_ID));
    }

    #[test]
    fn test_is_resolvable() {
        assert!(is_resolvable("users/ada"));
        assert!(!is_resolvable(""));
        assert!(!is_resolvable("users/-1"));
    }
}
