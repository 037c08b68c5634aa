//! Contracts for the external collaborators the cache sits in front of.

use async_trait::async_trait;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::{FieldMask, GetRequest, ListPage, ListRequest, Resource};

/// Typed operations of the remote resource service for one resource kind.
///
/// Transport, codec, timeouts and authentication all live behind this trait.
/// Implementations report failures through the [`ResourceError`] taxonomy.
#[async_trait]
pub trait ResourceService<R: Resource>: Send + Sync {
    /// Fetch one resource.
    async fn get(&self, request: &GetRequest) -> ResourceResult<R>;

    /// Whether [`ResourceService::batch_get`] is backed by a real endpoint.
    fn supports_batch_get(&self) -> bool {
        false
    }

    /// Fetch many resources by name.
    ///
    /// Best-effort: names that fail individually are omitted from the
    /// result rather than failing the whole call.
    async fn batch_get(&self, names: &[String]) -> ResourceResult<Vec<R>> {
        let _ = names;
        Err(ResourceError::Unsupported {
            operation: format!("{:?}.batch_get", R::kind()),
        })
    }

    /// Fetch one page of a filtered list.
    async fn list(&self, request: &ListRequest) -> ResourceResult<ListPage<R>>;

    /// Apply the fields named by `field_mask` and return the stored resource.
    async fn update(&self, resource: &R, field_mask: &FieldMask) -> ResourceResult<R> {
        let _ = (resource, field_mask);
        Err(ResourceError::Unsupported {
            operation: format!("{:?}.update", R::kind()),
        })
    }

    /// Soft-delete a resource.
    async fn delete(&self, name: &str) -> ResourceResult<()> {
        let _ = name;
        Err(ResourceError::Unsupported {
            operation: format!("{:?}.delete", R::kind()),
        })
    }

    /// Restore a soft-deleted resource.
    async fn undelete(&self, name: &str) -> ResourceResult<R> {
        let _ = name;
        Err(ResourceError::Unsupported {
            operation: format!("{:?}.undelete", R::kind()),
        })
    }
}
