//! # Conductor
//!
//! Application lifecycle orchestration for tokio services.
//!
//! Conductor wires a token-keyed resource registry, resilient clients for
//! external resources, background job queues and an HTTP listener into one
//! application with an ordered startup and a graceful, signal-driven shutdown.
//!
//! ## Features
//!
//! - **Resource registry**: singleton, scoped, transient and lazily built resources keyed by token
//! - **Startup modules**: pluggable subsystems driven through `initialize → start → stop`
//! - **Init hooks**: resource on-ready hooks run concurrently with isolated failures
//! - **Reconnecting clients**: backoff with jitter, permanent/transient failure split, degraded mode
//! - **Job queues**: producer and worker wrappers over a pluggable queue backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let emails = Arc::new(QueueClient::new("emails"));
//!     let worker = Arc::new(WorkerDispatcher::new("emails"));
//!     worker.register_job_handler("welcome", |job: Job| async move {
//!         Ok::<_, BoxError>(job.data)
//!     });
//!
//!     let app = Application::builder()
//!         .startup_module(WebServerModule::new(config.listen_addr()))
//!         .startup_module(JobsModule::new().queue(emails).worker(worker))
//!         .config(config)
//!         .build()?;
//!
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub mod common;
pub mod config;
pub mod di;
pub mod error;
pub mod exception;
pub mod jobs;
pub mod lifecycle;
pub mod module;
pub mod queue;
pub mod resource;
pub mod server;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod test_support;

// Re-export core types
pub use common::ApiResponse;
pub use di::{RegistryBuilder, ResourceRegistration, ResourceRegistry};
pub use error::{ConductorError, Result};
pub use module::Module;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use conductor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::common::ApiResponse;
    pub use crate::config::{AppConfig, ConfigService};
    pub use crate::di::{
        Proxy, RegistryBuilder, ResolverKind, ResourceRegistration, ResourceRegistry, tokens,
    };
    pub use crate::error::{ConductorError, Result};
    pub use crate::exception::{BoxError, QueueError, WorkerError};
    pub use crate::jobs::JobsModule;
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, ApplicationOrchestrator, HealthRegistry, HealthStatus,
        InitHookExecutor, LifecycleError, ShutdownHandler, StartupModule, shutdown_signal,
    };
    pub use crate::module::{CoreModule, Module, ResourcesModule};
    pub use crate::queue::{InMemoryBroker, Job, JobOptions, QueueBroker, QueueClient, QueueJob};
    pub use crate::resource::{DatabaseStore, RedisCache, ResourceError, ResourceStatus};
    pub use crate::server::WebServerModule;
    pub use crate::worker::{JobHandler, WorkerDispatcher};
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
