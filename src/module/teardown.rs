//! Closes the core resources when the application stops

use crate::di::{ResourceRegistry, tokens};
use crate::lifecycle::{LifecycleError, StartupModule};
use crate::resource::{DatabaseStore, RedisCache};
use async_trait::async_trait;
use std::sync::Arc;

const MODULE_NAME: &str = "resources";

/// Disconnects the cache and the store.
///
/// Registered ahead of every other startup module, so it stops last and the
/// connections outlive the modules that use them. Tokens overridden with a
/// different type are skipped.
#[derive(Default)]
pub struct ResourcesModule {
    cache: Option<Arc<RedisCache>>,
    store: Option<Arc<DatabaseStore>>,
}

impl ResourcesModule {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StartupModule for ResourcesModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn initialize(&mut self, registry: &ResourceRegistry) -> Result<(), LifecycleError> {
        self.cache = registry.resolve::<RedisCache>(tokens::CACHE).ok();
        self.store = registry.resolve::<DatabaseStore>(tokens::STORE).ok();
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        if let Some(cache) = self.cache.take() {
            if let Err(e) = cache.disconnect().await {
                tracing::error!("Error while closing the cache: {}", e);
                failures.push(e.to_string());
            }
        }
        if let Some(store) = self.store.take() {
            if let Err(e) = store.disconnect().await {
                tracing::error!("Error while closing the store: {}", e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::shutdown_failed(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConfigService};
    use crate::di::{RegistryBuilder, ResourceRegistration};
    use crate::lifecycle::InitHookExecutor;
    use crate::module::{CoreModule, Module};
    use crate::resource::ResourceStatus;
    use crate::test_support::LogCapture;
    use tracing::Level;

    fn core_registry() -> ResourceRegistry {
        let config = AppConfig::load(&ConfigService::from_pairs([("APP_NAME", "billing")])).unwrap();
        let mut builder = RegistryBuilder::new();
        builder.register(ResourceRegistration::value(tokens::CONFIG, config));
        CoreModule::register(&mut builder).unwrap();
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_stop_disconnects_cache_and_store() {
        let (logs, _guard) = LogCapture::install();
        let registry = core_registry();
        InitHookExecutor::run(&registry, registry.take_on_ready_hooks()).await;

        let mut module = ResourcesModule::new();
        module.initialize(&registry).await.unwrap();
        module.start().await.unwrap();
        module.stop().await.unwrap();

        assert!(logs.contains(Level::WARN, "cache is in degraded mode, nothing to disconnect"));
        assert!(logs.contains(Level::WARN, "store is in degraded mode, nothing to disconnect"));
        let cache = registry.resolve::<RedisCache>(tokens::CACHE).unwrap();
        assert_eq!(cache.status().await, ResourceStatus::Degraded);
    }

    #[tokio::test]
    async fn test_overridden_tokens_are_skipped() {
        let mut builder = RegistryBuilder::new();
        builder.register(ResourceRegistration::value(tokens::CACHE, "memcached".to_string()));
        let registry = builder.build().unwrap();

        let mut module = ResourcesModule::new();
        module.initialize(&registry).await.unwrap();
        assert!(module.cache.is_none());
        assert!(module.store.is_none());
        module.stop().await.unwrap();
    }
}
