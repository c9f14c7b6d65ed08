use crate::di::ResourceRegistry;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory = Arc<dyn Fn(&ResourceRegistry) -> anyhow::Result<Instance> + Send + Sync>;

/// Asynchronous hook run once the registry is populated.
pub type OnReadyFn =
    Arc<dyn Fn(ResourceRegistry) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// How the registry produces instances for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ResolverKind {
    /// One shared instance, constructed when the registry is built.
    Singleton,
    /// One instance per [`Scope`](crate::di::Scope); not resolvable from the root registry.
    Scoped,
    /// A fresh instance on every resolve.
    Transient,
    /// One shared instance, constructed on first access.
    Proxy,
}

/// A token-tagged entry for the [`RegistryBuilder`](crate::di::RegistryBuilder).
///
/// The resolver kind is chosen explicitly at registration time. An optional
/// `on_ready` hook is collected by the registry and handed to the
/// [`InitHookExecutor`](crate::lifecycle::InitHookExecutor) during initialization.
///
/// # Example
///
/// ```rust,ignore
/// let registration = ResourceRegistration::singleton(tokens::CACHE, |registry| {
///     let config = registry.resolve::<AppConfig>(tokens::CONFIG)?;
///     let client = ReconnectingClient::<RedisConnector>::new("cache", config.redis.clone());
///     Ok(RedisCache::new(client, config.cache_keys.clone()))
/// })
/// .on_ready(|registry| async move {
///     registry.resolve::<RedisCache>(tokens::CACHE)?.connect().await?;
///     anyhow::Ok(())
/// });
/// ```
pub struct ResourceRegistration {
    pub(crate) token: String,
    pub(crate) kind: ResolverKind,
    pub(crate) factory: Factory,
    pub(crate) on_ready: Option<OnReadyFn>,
}

impl ResourceRegistration {
    fn new<T, F>(token: impl Into<String>, kind: ResolverKind, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |registry: &ResourceRegistry| {
            factory(registry).map(|instance| Arc::new(instance) as Instance)
        });
        Self {
            token: token.into(),
            kind,
            factory,
            on_ready: None,
        }
    }

    pub fn singleton<T, F>(token: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(token, ResolverKind::Singleton, factory)
    }

    pub fn scoped<T, F>(token: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(token, ResolverKind::Scoped, factory)
    }

    pub fn transient<T, F>(token: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(token, ResolverKind::Transient, factory)
    }

    pub fn proxy<T, F>(token: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResourceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(token, ResolverKind::Proxy, factory)
    }

    /// Register an already constructed value as a singleton.
    pub fn value<T>(token: impl Into<String>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::singleton(token, move |_| Ok(value.clone()))
    }

    /// Register an instance that is already shared elsewhere.
    ///
    /// Resolving the token hands out the same allocation.
    pub fn shared<T>(token: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |_: &ResourceRegistry| Ok(instance.clone() as Instance));
        Self {
            token: token.into(),
            kind: ResolverKind::Singleton,
            factory,
            on_ready: None,
        }
    }

    /// Attach a hook that runs after every registration has been applied.
    pub fn on_ready<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ResourceRegistry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_ready = Some(Arc::new(move |registry| Box::pin(hook(registry))));
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn kind(&self) -> ResolverKind {
        self.kind
    }

    pub fn has_on_ready(&self) -> bool {
        self.on_ready.is_some()
    }
}

/// A named on-ready hook, as consumed by the init hook executor.
#[derive(Clone)]
pub struct InitHook {
    name: String,
    run: OnReadyFn,
}

impl InitHook {
    pub fn new<F, Fut>(name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(ResourceRegistry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |registry| Box::pin(hook(registry))),
        }
    }

    pub(crate) fn from_parts(name: String, run: OnReadyFn) -> Self {
        Self { name, run }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, registry: ResourceRegistry) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)(registry)
    }
}

impl std::fmt::Debug for InitHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitHook").field("name", &self.name).finish()
    }
}
