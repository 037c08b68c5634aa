//! Resource identity, projection views and request shapes.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Id segment carried by placeholder resources (`projects/-1`).
pub const UNKNOWN_ID: &str = "-1";

/// Display title used by placeholder resources.
pub const UNKNOWN_TITLE: &str = "<<Unknown>>";

/// Resource kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Project,
    User,
    Sheet,
    Release,
    DatabaseMetadata,
}

impl ResourceKind {
    /// Collection prefix of resource names of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Project => "projects/",
            Self::User => "users/",
            Self::Sheet => "sheets/",
            Self::Release => "releases/",
            Self::DatabaseMetadata => "instances/",
        }
    }

    /// Name of the cache namespace holding resources of this kind by name.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Project => "project-by-name",
            Self::User => "user-by-name",
            Self::Sheet => "sheet-by-name",
            Self::Release => "release-by-name",
            Self::DatabaseMetadata => "database-metadata-by-name",
        }
    }

    /// Prefix of every list-cache key recorded for this kind.
    pub fn list_namespace(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
            Self::Sheet => "sheet",
            Self::Release => "release",
            Self::DatabaseMetadata => "database-metadata",
        }
    }
}

/// Projection level of a fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum View {
    /// Partial fields only.
    #[default]
    Basic,
    /// All fields.
    Full,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Full => "FULL",
        }
    }

    /// Whether an entry fetched at `self` satisfies a read asking for `wanted`.
    pub fn satisfies(&self, wanted: View) -> bool {
        *self >= wanted
    }
}

/// A resource addressed by a stable name across views.
pub trait Resource: Clone + Debug + Send + Sync + 'static {
    /// The kind of this resource.
    fn kind() -> ResourceKind;

    /// The stable resource name (`projects/acme`).
    fn name(&self) -> &str;

    /// Build the placeholder value handed out when `name` cannot be resolved.
    fn unknown(name: &str) -> Self;

    /// Returns true if this value is a placeholder rather than fetched data.
    fn is_placeholder(&self) -> bool;
}

/// Returns true for names that identify the placeholder rather than a real
/// resource, e.g. `projects/-1`.
pub fn is_placeholder_name(name: &str) -> bool {
    name.rsplit('/').next() == Some(UNKNOWN_ID)
}

/// Returns true if a referenced name should never be fetched.
pub fn is_unresolvable_name(name: &str) -> bool {
    name.trim().is_empty() || is_placeholder_name(name)
}

/// The placeholder name for a kind, used when a reference is empty.
pub fn unknown_name(kind: ResourceKind) -> String {
    format!("{}{}", kind.collection(), UNKNOWN_ID)
}

/// Restricts a nested-resource fetch to one schema, optionally one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    pub schema: String,
    pub table: Option<String>,
}

impl Slice {
    pub fn schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: None,
        }
    }

    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: Some(table.into()),
        }
    }
}

/// Request for a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub name: String,
    pub view: View,
    /// Only meaningful for resources with nested named collections.
    pub slice: Option<Slice>,
}

impl GetRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            view: View::Full,
            slice: None,
        }
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    pub fn with_slice(mut self, slice: Option<Slice>) -> Self {
        self.slice = slice;
        self
    }
}

/// Request for one page of a filtered list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListRequest {
    /// Service-side filter expression, empty for "all".
    pub filter: String,
    pub page_size: i32,
    /// Empty for the first page.
    pub page_token: String,
    pub show_deleted: bool,
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<R> {
    pub resources: Vec<R>,
    /// Empty when this is the last page.
    pub next_page_token: String,
}

impl<R> ListPage<R> {
    pub fn last(resources: Vec<R>) -> Self {
        Self {
            resources,
            next_page_token: String::new(),
        }
    }
}

/// Paths of the fields an update touches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}
