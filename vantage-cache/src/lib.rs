//! Vantage Cache - Client-Side Resource Caching
//!
//! Generic machinery shared by every resource store:
//!
//! - [`CacheKey`]: composite keys with an injective encoding
//! - [`NamespaceCache`]: entity cache plus single-flight request cache
//! - [`CacheRegistry`]: lazily created namespaces for one session
//! - [`ListCache`]: liveness markers of filtered list queries
//! - [`ViewedCache`]: BASIC/FULL reconciliation for nested resources
//! - [`ResourceStore`]: the per-kind accessor with batched reference
//!   resolution used by composers

pub mod accessor;
pub mod compose;
pub mod key;
pub mod list;
pub mod namespace;
pub mod registry;
pub mod stats;
pub mod view_merge;

pub use accessor::{ListOutcome, ResourceStore};
pub use compose::{is_resolvable, Composer, ReferenceCollector, ResolvedReferences};
pub use key::{CacheKey, CacheKeyBuilder, KEY_SEPARATOR};
pub use list::{ListCache, ListCacheEntry, ListKey, LIST_KEY_SEPARATOR};
pub use namespace::{FetchTicket, NamespaceCache, NamespaceKey, NamespaceValue, PendingFetch};
pub use registry::CacheRegistry;
pub use stats::CacheStats;
pub use view_merge::{
    merge_named, replace_named, FetchScope, NamedItem, ViewMergeable, ViewedCache,
};
