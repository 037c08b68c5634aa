//! Error reporting policy around [`ResourceStore`].
//!
//! The cache never swallows errors. [`Accessor`] decides what the caller
//! sees: the plain variants report failures to the notifier and return them,
//! the silent variants stay quiet and hand out placeholders where the UI can
//! carry on without the resource.

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;
use vantage_cache::ResourceStore;
use vantage_core::{
    FieldMask, Resource, ResourceError, ResourceResult, ResourceService, VantageError, View,
};

use crate::context::StoreContext;
use crate::notifications::Notification;

/// A [`ResourceStore`] plus the session's notification policy.
pub struct Accessor<R: Resource> {
    store: ResourceStore<R>,
    context: StoreContext,
}

impl<R: Resource> Clone for Accessor<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            context: self.context.clone(),
        }
    }
}

impl<R: Resource> Accessor<R> {
    pub fn new(
        context: &StoreContext,
        service: Arc<dyn ResourceService<R>>,
    ) -> Result<Self, VantageError> {
        Ok(Self {
            store: ResourceStore::new(context.registry(), service, context.config().clone())?,
            context: context.clone(),
        })
    }

    pub fn store(&self) -> &ResourceStore<R> {
        &self.store
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    /// Fetch through the cache, notifying on failure.
    pub async fn get_or_fetch(&self, name: &str) -> ResourceResult<R> {
        self.get_or_fetch_view(name, View::Full).await
    }

    pub async fn get_or_fetch_view(&self, name: &str, view: View) -> ResourceResult<R> {
        self.store
            .get_or_fetch_view(name, view)
            .await
            .map_err(|err| self.report(name, err))
    }

    /// Fetch through the cache without notifying. NotFound and Unauthorized
    /// yield the placeholder; transport failures are still returned.
    pub async fn get_or_fetch_silent(&self, name: &str) -> ResourceResult<R> {
        match self.store.get_or_fetch(name).await {
            Ok(resource) => Ok(resource),
            Err(err) if err.is_not_found() || err.is_unauthorized() => {
                debug!(name = %name, error = %err, "silent fetch, using placeholder");
                Ok(R::unknown(name))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn update(&self, resource: &R, field_mask: &FieldMask) -> ResourceResult<R> {
        self.store
            .update(resource, field_mask)
            .await
            .map_err(|err| self.report(resource.name(), err))
    }

    pub async fn delete(&self, name: &str) -> ResourceResult<()> {
        self.store
            .delete(name)
            .await
            .map_err(|err| self.report(name, err))
    }

    pub async fn undelete(&self, name: &str) -> ResourceResult<R> {
        self.store
            .undelete(name)
            .await
            .map_err(|err| self.report(name, err))
    }

    /// Notify about a failure the user should see. NotFound is left to the
    /// caller.
    pub(crate) fn report(&self, name: &str, err: ResourceError) -> ResourceError {
        if !err.is_not_found() {
            self.context.notify(Notification::error(format!(
                "Failed to load {:?} {}: {}",
                R::kind(),
                name,
                err
            )));
        }
        err
    }
}

impl<R: Resource> Deref for Accessor<R> {
    type Target = ResourceStore<R>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
