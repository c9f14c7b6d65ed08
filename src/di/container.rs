use crate::di::registration::{Factory, InitHook, Instance, OnReadyFn, ResolverKind};
use crate::di::{Proxy, Scope};
use crate::error::{ConductorError, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) struct Registration {
    pub(crate) kind: ResolverKind,
    pub(crate) factory: Factory,
}

struct RegistryInner {
    registrations: HashMap<String, Registration>,
    instances: DashMap<String, Instance>,
    on_ready: Mutex<Vec<(String, OnReadyFn)>>,
}

/// Token-keyed resource registry.
///
/// Built once by [`RegistryBuilder`](crate::di::RegistryBuilder) and then shared by
/// cheap clones. The registry owns every singleton instance; everyone else only
/// receives `Arc` references to them.
#[derive(Clone)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    pub(crate) fn new(
        registrations: HashMap<String, Registration>,
        on_ready: Vec<(String, OnReadyFn)>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                registrations,
                instances: DashMap::new(),
                on_ready: Mutex::new(on_ready),
            }),
        }
    }

    /// Resolve the instance registered under `token`.
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &str) -> Result<Arc<T>> {
        let instance = self.resolve_instance(token, None)?;
        instance
            .downcast::<T>()
            .map_err(|_| ConductorError::downcast_failed::<T>(token))
    }

    /// Get a handle that resolves `token` on first access.
    pub fn proxy<T: Send + Sync + 'static>(&self, token: &str) -> Result<Proxy<T>> {
        if !self.contains(token) {
            return Err(ConductorError::not_found(token));
        }
        Ok(Proxy::new(self.clone(), token))
    }

    /// Open a child scope for scoped registrations.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.registrations.contains_key(token)
    }

    pub fn kind_of(&self, token: &str) -> Option<ResolverKind> {
        self.inner.registrations.get(token).map(|r| r.kind)
    }

    pub fn len(&self) -> usize {
        self.inner.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registrations.is_empty()
    }

    /// Drain the on-ready hooks collected from the registrations.
    ///
    /// Hooks are handed out exactly once; later calls return an empty list.
    pub fn take_on_ready_hooks(&self) -> Vec<InitHook> {
        let mut hooks = self
            .inner
            .on_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        hooks
            .drain(..)
            .map(|(token, run)| InitHook::from_parts(token, run))
            .collect()
    }

    pub(crate) fn resolve_instance(
        &self,
        token: &str,
        scope: Option<&DashMap<String, Instance>>,
    ) -> Result<Instance> {
        let registration = self
            .inner
            .registrations
            .get(token)
            .ok_or_else(|| ConductorError::not_found(token))?;

        match registration.kind {
            ResolverKind::Singleton | ResolverKind::Proxy => {
                self.cached(&self.inner.instances, token, registration)
            }
            ResolverKind::Transient => self.construct(token, registration),
            ResolverKind::Scoped => match scope {
                Some(instances) => self.cached(instances, token, registration),
                None => Err(ConductorError::ScopeMismatch {
                    message: format!(
                        "'{}' is scoped and cannot be resolved from the root registry",
                        token
                    ),
                }),
            },
        }
    }

    fn cached(
        &self,
        instances: &DashMap<String, Instance>,
        token: &str,
        registration: &Registration,
    ) -> Result<Instance> {
        if let Some(instance) = instances.get(token) {
            return Ok(instance.value().clone());
        }
        // Built outside the map lock: the factory may resolve other tokens.
        let built = self.construct(token, registration)?;
        Ok(instances
            .entry(token.to_string())
            .or_insert(built)
            .value()
            .clone())
    }

    fn construct(&self, token: &str, registration: &Registration) -> Result<Instance> {
        tracing::trace!("Constructing '{}' ({})", token, registration.kind);
        (registration.factory)(self).map_err(|e| ConductorError::ConstructionFailed {
            token: token.to_string(),
            message: format!("{:#}", e),
        })
    }
}
