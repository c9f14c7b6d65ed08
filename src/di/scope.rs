use crate::di::registration::Instance;
use crate::di::ResourceRegistry;
use crate::error::{ConductorError, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// A child resolution scope, e.g. one per request or per job.
///
/// Scoped registrations get one instance per scope. Every other kind is
/// delegated to the parent registry.
pub struct Scope {
    registry: ResourceRegistry,
    instances: DashMap<String, Instance>,
}

impl Scope {
    pub(crate) fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
            instances: DashMap::new(),
        }
    }

    pub fn resolve<T: Send + Sync + 'static>(&self, token: &str) -> Result<Arc<T>> {
        let instance = self.registry.resolve_instance(token, Some(&self.instances))?;
        instance
            .downcast::<T>()
            .map_err(|_| ConductorError::downcast_failed::<T>(token))
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }
}
