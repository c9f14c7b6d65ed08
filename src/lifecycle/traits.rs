//! Startup module contract
//!
//! A startup module is a pluggable subsystem (listener, job runner, ...) that the
//! [`ApplicationOrchestrator`](super::ApplicationOrchestrator) drives through
//! `initialize → start → stop`.

use super::LifecycleError;
use crate::di::ResourceRegistry;
use async_trait::async_trait;
use strum_macros::{Display, EnumString};

/// A subsystem participating in the application lifecycle
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::{StartupModule, LifecycleError};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl StartupModule for MetricsPusher {
///     fn name(&self) -> &str {
///         "MetricsPusher"
///     }
///
///     async fn initialize(&mut self, registry: &ResourceRegistry) -> Result<(), LifecycleError> {
///         self.cache = Some(registry.resolve(tokens::CACHE)
///             .map_err(|e| LifecycleError::init_failed(e.to_string()))?);
///         Ok(())
///     }
///
///     async fn start(&mut self) -> Result<(), LifecycleError> {
///         self.task = Some(tokio::spawn(push_loop(self.cache.clone())));
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<(), LifecycleError> {
///         if let Some(task) = self.task.take() {
///             task.abort();
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait StartupModule: Send + Sync {
    /// Unique name of the module, used as its key in the orchestrator.
    fn name(&self) -> &str;

    /// Prepare the module using resources from the registry.
    ///
    /// Called once, in registration order, before any module starts.
    async fn initialize(&mut self, registry: &ResourceRegistry) -> Result<(), LifecycleError>;

    /// Begin serving. Called in registration order after initialization.
    async fn start(&mut self) -> Result<(), LifecycleError>;

    /// Release everything acquired in `initialize`/`start`.
    ///
    /// Called in **reverse** registration order. Failures are logged and do not
    /// prevent other modules from stopping.
    async fn stop(&mut self) -> Result<(), LifecycleError>;
}

/// Where a module is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ModuleState {
    Registered,
    Initialized,
    Started,
    Stopped,
}
