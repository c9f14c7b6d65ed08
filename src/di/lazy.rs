use crate::di::ResourceRegistry;
use crate::error::Result;
use std::sync::{Arc, OnceLock};

/// A lazily resolved handle to a registered resource.
///
/// `Proxy<T>` holds the registry and resolves `T` only when it is first accessed.
/// Resources that depend on each other can hold a proxy instead of resolving
/// eagerly inside their factory, which breaks construction cycles.
pub struct Proxy<T: 'static + Send + Sync> {
    registry: ResourceRegistry,
    token: String,
    instance: OnceLock<Arc<T>>,
}

impl<T: 'static + Send + Sync> Proxy<T> {
    pub(crate) fn new(registry: ResourceRegistry, token: impl Into<String>) -> Self {
        Self {
            registry,
            token: token.into(),
            instance: OnceLock::new(),
        }
    }

    /// Resolve the resource, caching it in this handle.
    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(instance) = self.instance.get() {
            return Ok(Arc::clone(instance));
        }
        let resolved = self.registry.resolve::<T>(&self.token)?;
        Ok(Arc::clone(self.instance.get_or_init(|| resolved)))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_resolved(&self) -> bool {
        self.instance.get().is_some()
    }
}

impl<T: 'static + Send + Sync> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        let instance = OnceLock::new();
        if let Some(resolved) = self.instance.get() {
            let _ = instance.set(Arc::clone(resolved));
        }
        Self {
            registry: self.registry.clone(),
            token: self.token.clone(),
            instance,
        }
    }
}
