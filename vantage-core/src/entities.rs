//! Resource entities fetched from the remote service.
//!
//! These are pure data structures. Every entity is addressed by a stable
//! `name`; placeholders carry `uid == UNKNOWN_ID`.

use crate::resource::{Resource, ResourceKind, UNKNOWN_ID, UNKNOWN_TITLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by soft-deletable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResourceState {
    #[default]
    Active,
    Deleted,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Deleted => "DELETED",
        }
    }
}

// ============================================================================
// PROJECT
// ============================================================================

/// A project. Format: `projects/{project}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub uid: String,
    pub title: String,
    pub key: String,
    pub state: ResourceState,
}

impl Project {
    /// The `{project}` segment of the name.
    pub fn resource_id(&self) -> &str {
        self.name.trim_start_matches("projects/")
    }
}

impl Resource for Project {
    fn kind() -> ResourceKind {
        ResourceKind::Project
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: UNKNOWN_ID.to_string(),
            title: UNKNOWN_TITLE.to_string(),
            key: String::new(),
            state: ResourceState::Active,
        }
    }

    fn is_placeholder(&self) -> bool {
        self.uid == UNKNOWN_ID
    }
}

// ============================================================================
// USER
// ============================================================================

/// Principal type of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UserType {
    #[default]
    User,
    ServiceAccount,
    SystemBot,
}

/// A user. Format: `users/{email}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub uid: String,
    pub email: String,
    pub title: String,
    pub user_type: UserType,
    pub state: ResourceState,
}

impl Resource for User {
    fn kind() -> ResourceKind {
        ResourceKind::User
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: UNKNOWN_ID.to_string(),
            email: name.trim_start_matches("users/").to_string(),
            title: UNKNOWN_TITLE.to_string(),
            user_type: UserType::User,
            state: ResourceState::Active,
        }
    }

    fn is_placeholder(&self) -> bool {
        self.uid == UNKNOWN_ID
    }
}

// ============================================================================
// SHEET
// ============================================================================

/// A stored SQL statement. Format: `projects/{project}/sheets/{sheet}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub uid: String,
    pub title: String,
    /// Creator user name, `users/{email}`.
    pub creator: String,
    pub content: String,
    pub content_size: i64,
}

impl Resource for Sheet {
    fn kind() -> ResourceKind {
        ResourceKind::Sheet
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: UNKNOWN_ID.to_string(),
            title: UNKNOWN_TITLE.to_string(),
            creator: String::new(),
            content: String::new(),
            content_size: 0,
        }
    }

    fn is_placeholder(&self) -> bool {
        self.uid == UNKNOWN_ID
    }
}

// ============================================================================
// RELEASE
// ============================================================================

/// One file of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    /// The sheet holding the statement, `projects/{project}/sheets/{sheet}`.
    pub sheet: String,
    pub sheet_sha1: String,
    pub version: String,
}

/// A release. Format: `projects/{project}/releases/{release}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub uid: String,
    pub title: String,
    /// Creator user name, `users/{email}`.
    pub creator: String,
    pub files: Vec<ReleaseFile>,
    pub create_time: DateTime<Utc>,
    pub state: ResourceState,
}

impl Release {
    /// The owning project name, derived from the release name.
    pub fn project_name(&self) -> String {
        project_of(&self.name)
    }
}

impl Resource for Release {
    fn kind() -> ResourceKind {
        ResourceKind::Release
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: UNKNOWN_ID.to_string(),
            title: UNKNOWN_TITLE.to_string(),
            creator: String::new(),
            files: Vec::new(),
            create_time: DateTime::UNIX_EPOCH,
            state: ResourceState::Active,
        }
    }

    fn is_placeholder(&self) -> bool {
        self.uid == UNKNOWN_ID
    }
}

/// Extract `projects/{project}` from a project-scoped resource name.
/// Returns an empty string when the name is not project-scoped.
pub fn project_of(name: &str) -> String {
    let mut parts = name.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some("projects"), Some(id)) if !id.is_empty() => format!("projects/{}", id),
        _ => String::new(),
    }
}

// ============================================================================
// DATABASE METADATA
// ============================================================================

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub position: i32,
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Table metadata. Columns are only populated by FULL fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
    pub engine: String,
    pub comment: String,
    pub row_count: i64,
}

/// View metadata. The definition is only populated by FULL fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMetadata {
    pub name: String,
    pub definition: String,
    pub comment: String,
}

/// Schema metadata. Empty name for engines without schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
    pub tables: Vec<TableMetadata>,
    pub views: Vec<ViewMetadata>,
}

/// Metadata of one database.
/// Format: `instances/{instance}/databases/{database}/metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub name: String,
    pub character_set: String,
    pub collation: String,
    pub schemas: Vec<SchemaMetadata>,
}

impl DatabaseMetadata {
    pub fn schema(&self, name: &str) -> Option<&SchemaMetadata> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&TableMetadata> {
        self.schema(schema)?.tables.iter().find(|t| t.name == table)
    }
}

impl Resource for DatabaseMetadata {
    fn kind() -> ResourceKind {
        ResourceKind::DatabaseMetadata
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            character_set: String::new(),
            collation: String::new(),
            schemas: Vec::new(),
        }
    }

    fn is_placeholder(&self) -> bool {
        self.schemas.is_empty() && self.character_set.is_empty() && self.collation.is_empty()
    }
}
