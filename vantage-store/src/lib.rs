//! Vantage Store - Resource Stores
//!
//! Per-kind accessors built on `vantage-cache`. Every store of one session
//! shares a [`StoreContext`]: the cache registry, the configuration and the
//! notification sink.
//!
//! - [`ProjectStore`], [`UserStore`], [`SheetStore`]: cached gets, filtered
//!   lists and mutations
//! - [`ReleaseStore`]: releases composed with their project, creator and
//!   sheets
//! - [`DatabaseMetadataStore`]: BASIC/FULL metadata with schema and table
//!   slices

pub mod accessor;
pub mod context;
pub mod database_metadata;
pub mod durable;
mod filter;
pub mod notifications;
pub mod project;
pub mod release;
pub mod sheet;
pub mod telemetry;
pub mod user;

pub use accessor::Accessor;
pub use context::StoreContext;
pub use database_metadata::{DatabaseMetadataStore, METADATA_REQUEST_NAMESPACE};
pub use durable::JsonFileStore;
pub use notifications::{
    Notification, NotificationLevel, Notifier, RecordingNotifier, TracingNotifier,
};
pub use project::{ProjectFilter, ProjectStore, MAX_RECENT_PROJECTS, RECENT_PROJECTS_KEY};
pub use release::{ComposedRelease, ComposedReleaseFile, ReleaseStore, COMPOSED_RELEASE_NAMESPACE};
pub use sheet::SheetStore;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError, DEFAULT_FILTER};
pub use user::{user_name, UserFilter, UserStore};
