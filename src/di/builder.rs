use crate::di::container::Registration;
use crate::di::registration::{ResolverKind, ResourceRegistration};
use crate::di::ResourceRegistry;
use crate::error::Result;
use std::collections::HashMap;

/// Builder for constructing a [`ResourceRegistry`]
///
/// Collects registrations in order, then freezes them into a registry. Singletons
/// are constructed during [`build`](Self::build), so a failing factory surfaces
/// before any module starts.
///
/// # Example
/// ```rust,ignore
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(ResourceRegistration::value(tokens::CONFIG, config))
///     .register(ResourceRegistration::singleton(tokens::HEALTH, |_| Ok(HealthRegistry::new())));
/// let registry = builder.build()?;
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: Vec<ResourceRegistration>,
}

impl RegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration
    ///
    /// A token that is already present is replaced in place, keeping tokens unique.
    pub fn register(&mut self, registration: ResourceRegistration) -> &mut Self {
        match self
            .registrations
            .iter_mut()
            .find(|existing| existing.token == registration.token)
        {
            Some(existing) => {
                tracing::warn!(
                    "Resource '{}' registered more than once, replacing previous registration",
                    registration.token
                );
                *existing = registration;
            }
            None => self.registrations.push(registration),
        }
        self
    }

    pub fn contains(&self, token: &str) -> bool {
        self.registrations.iter().any(|r| r.token == token)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Build the registry and construct every singleton
    pub fn build(self) -> Result<ResourceRegistry> {
        let mut registrations = HashMap::with_capacity(self.registrations.len());
        let mut on_ready = Vec::new();
        let mut singletons = Vec::new();

        for registration in self.registrations {
            if registration.kind == ResolverKind::Singleton {
                singletons.push(registration.token.clone());
            }
            if let Some(hook) = registration.on_ready {
                on_ready.push((registration.token.clone(), hook));
            }
            registrations.insert(
                registration.token,
                Registration {
                    kind: registration.kind,
                    factory: registration.factory,
                },
            );
        }

        let registry = ResourceRegistry::new(registrations, on_ready);
        for token in &singletons {
            registry.resolve_instance(token, None)?;
        }

        tracing::debug!(
            "Resource registry built ({} registrations, {} singletons)",
            registry.len(),
            singletons.len()
        );
        Ok(registry)
    }
}
