//! Registrations for the resources every application gets

use super::Module;
use crate::config::AppConfig;
use crate::di::{RegistryBuilder, ResourceRegistration, tokens};
use crate::error::Result;
use crate::lifecycle::HealthRegistry;
use crate::queue::{InMemoryBroker, QueueBroker};
use crate::resource::{BackoffPolicy, DatabaseStore, ReconnectingClient, RedisCache, RedisConnector};
use std::sync::Arc;

/// Health registry, cache, store and queue broker.
///
/// Expects [`tokens::CONFIG`] to hold an [`AppConfig`]. The cache and the
/// store connect from `on_ready` hooks, so a slow or missing backend never
/// blocks the other resources.
pub struct CoreModule;

impl Module for CoreModule {
    fn register(builder: &mut RegistryBuilder) -> Result<()> {
        builder.register(ResourceRegistration::singleton(tokens::HEALTH, |_| {
            Ok(HealthRegistry::new())
        }));

        builder.register(
            ResourceRegistration::singleton(tokens::CACHE, |registry| {
                let config = registry.resolve::<AppConfig>(tokens::CONFIG)?;
                let health = registry.resolve::<HealthRegistry>(tokens::HEALTH)?;
                let client = ReconnectingClient::<RedisConnector>::new("cache", config.redis.clone())
                    .with_policy(policy(&config))
                    .with_health(health);
                Ok(RedisCache::new(client, config.cache_keys.clone()))
            })
            .on_ready(|registry| async move {
                registry.resolve::<RedisCache>(tokens::CACHE)?.connect().await?;
                anyhow::Ok(())
            }),
        );

        builder.register(
            ResourceRegistration::singleton(tokens::STORE, |registry| {
                let config = registry.resolve::<AppConfig>(tokens::CONFIG)?;
                let health = registry.resolve::<HealthRegistry>(tokens::HEALTH)?;
                let client = ReconnectingClient::new("store", config.database.clone())
                    .with_policy(policy(&config))
                    .with_health(health);
                Ok(DatabaseStore::new(client))
            })
            .on_ready(|registry| async move {
                registry.resolve::<DatabaseStore>(tokens::STORE)?.connect().await?;
                anyhow::Ok(())
            }),
        );

        builder.register(ResourceRegistration::singleton(
            tokens::QUEUE_BROKER,
            |_| -> anyhow::Result<Arc<dyn QueueBroker>> { Ok(Arc::new(InMemoryBroker::new())) },
        ));

        Ok(())
    }
}

fn policy(config: &AppConfig) -> BackoffPolicy {
    BackoffPolicy::default().with_max_attempts(config.connect_max_attempts)
}
