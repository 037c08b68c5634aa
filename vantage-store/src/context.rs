//! Session-wide context shared by every store.

use std::sync::Arc;

use vantage_cache::CacheRegistry;
use vantage_core::CacheConfig;

use crate::notifications::{Notification, Notifier, TracingNotifier};

/// The cache registry, configuration and notification sink of one client
/// session. Cheap to clone.
#[derive(Clone)]
pub struct StoreContext {
    registry: Arc<CacheRegistry>,
    config: CacheConfig,
    notifier: Arc<dyn Notifier>,
}

impl StoreContext {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            registry: Arc::new(CacheRegistry::new()),
            config,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    /// Drop every cached entity, in-flight request and list marker, e.g. on
    /// logout or workspace switch.
    pub fn clear_all(&self) {
        self.registry.clear_all();
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
