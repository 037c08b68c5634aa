//! Vantage Core - Resource Types and Collaborator Contracts
//!
//! Pure data structures and the traits of the external collaborators the
//! cache layer talks to. All other crates depend on this.

pub mod config;
pub mod durable;
pub mod entities;
pub mod error;
pub mod resource;
pub mod service;

pub use config::CacheConfig;
pub use durable::{DurableStore, DurableStoreExt};
pub use entities::{
    project_of, ColumnMetadata, DatabaseMetadata, Project, Release, ReleaseFile, ResourceState,
    SchemaMetadata, Sheet, TableMetadata, User, UserType, ViewMetadata,
};
pub use error::{
    CacheError, ConfigError, PersistenceError, ResourceError, ResourceResult, VantageError,
    VantageResult,
};
pub use resource::{
    is_placeholder_name, is_unresolvable_name, unknown_name, FieldMask, GetRequest, ListPage,
    ListRequest, Resource, ResourceKind, Slice, View, UNKNOWN_ID, UNKNOWN_TITLE,
};
pub use service::ResourceService;
