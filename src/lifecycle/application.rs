//! Application Bootstrap
//!
//! Provides a high-level API for wiring configuration, resources and startup
//! modules, and for running them until a shutdown signal arrives.

use super::{
    ApplicationOrchestrator, HookReport, LifecycleError, Result, ShutdownHandler, StartupModule,
    shutdown_signal,
};
use crate::config::AppConfig;
use crate::di::{RegistryBuilder, ResourceRegistration, ResourceRegistry, tokens};
use crate::module::{CoreModule, Module, ModuleRegistrar, ResourcesModule};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A fully wired application
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::Application;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let app = Application::builder()
///         .config(AppConfig::from_env()?)
///         .module::<BillingModule>()
///         .startup_module(WebServerModule::new("0.0.0.0:3000"))
///         .build()?;
///
///     app.run().await?;
///     Ok(())
/// }
/// ```
pub struct Application {
    config: AppConfig,
    orchestrator: Arc<ApplicationOrchestrator>,
    init_timeout: Option<Duration>,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        self.orchestrator.registry()
    }

    pub fn orchestrator(&self) -> &Arc<ApplicationOrchestrator> {
        &self.orchestrator
    }

    /// Create a shutdown handler bounded by the configured shutdown timeout
    pub fn shutdown_handler(&self) -> ShutdownHandler {
        ShutdownHandler::new(Arc::clone(&self.orchestrator), self.config.shutdown_timeout)
    }

    /// Initialize every module, then run the resources' on-ready hooks.
    ///
    /// Hook failures do not fail initialization; they are reported in the
    /// returned [`HookReport`] and in the health registry.
    pub async fn initialize(&self) -> Result<HookReport> {
        tracing::info!("Starting application initialization...");
        let report = match self.init_timeout {
            Some(timeout) => self.orchestrator.initialize_with_timeout(timeout).await?,
            None => self.orchestrator.initialize().await?,
        };

        if report.all_succeeded() {
            tracing::info!("Application initialization complete");
        } else {
            tracing::warn!(
                "Application initialized with {} of {} init hooks failed",
                report.failed.len(),
                report.total()
            );
        }
        Ok(report)
    }

    pub async fn start(&self) -> Result<()> {
        self.orchestrator.start().await?;
        tracing::info!("{} started", self.config.app_name);
        Ok(())
    }

    /// Stop every module, bounded by the configured shutdown timeout
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.shutdown_handler().shutdown().await?;
        tracing::info!("Application shutdown complete");
        Ok(())
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Initialize and start, wait for `signal`, then stop.
    ///
    /// A module that fails to initialize or start aborts the run; modules that
    /// were already brought up are stopped before the error is returned.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let started = match self.initialize().await {
            Ok(_) => self.start().await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            tracing::error!(fatal = true, "Application failed to start: {}", e);
            if let Err(stop_error) = self.stop().await {
                tracing::error!("Error while stopping after a failed start: {}", stop_error);
            }
            return Err(e);
        }

        signal.await;
        self.stop().await
    }
}

/// Builder for Application
pub struct ApplicationBuilder {
    config: Option<AppConfig>,
    registrars: Vec<ModuleRegistrar>,
    registrations: Vec<ResourceRegistration>,
    modules: Vec<Box<dyn StartupModule>>,
    init_timeout: Option<Duration>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            registrars: vec![CoreModule::register],
            registrations: Vec::new(),
            modules: Vec::new(),
            init_timeout: None,
        }
    }

    /// Use `config` instead of reading the environment
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Apply a feature module's registrations, after the core resources
    pub fn module<M: Module>(mut self) -> Self {
        self.registrars.push(M::register);
        self
    }

    /// Add one registration, applied after every feature module
    pub fn register(mut self, registration: ResourceRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Add a startup module. Modules start in the order they are added.
    pub fn startup_module<M: StartupModule + 'static>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Bound the initialize phase, hooks included
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Build the registry and the orchestrator.
    ///
    /// # Errors
    ///
    /// Fails when the environment holds invalid settings or a singleton
    /// cannot be constructed.
    pub fn build(self) -> Result<Application> {
        let config = match self.config {
            Some(config) => config,
            None => AppConfig::from_env().map_err(|e| LifecycleError::init_failed(e.to_string()))?,
        };

        let mut builder = RegistryBuilder::new();
        builder.register(ResourceRegistration::value(tokens::CONFIG, config.clone()));
        for register in self.registrars {
            register(&mut builder).map_err(|e| LifecycleError::init_failed(e.to_string()))?;
        }
        for registration in self.registrations {
            builder.register(registration);
        }
        let registry = builder
            .build()
            .map_err(|e| LifecycleError::init_failed(e.to_string()))?;

        let mut orchestrator = ApplicationOrchestrator::new(registry);
        orchestrator.register_module(ResourcesModule::new());
        for module in self.modules {
            orchestrator.register_boxed(module);
        }

        Ok(Application {
            config,
            orchestrator: Arc::new(orchestrator),
            init_timeout: self.init_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigService;
    use crate::lifecycle::{HealthRegistry, HealthStatus, ModuleState};
    use crate::test_support::LogCapture;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing::Level;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
        fail_start: bool,
    }

    #[async_trait]
    impl StartupModule for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn initialize(&mut self, _registry: &ResourceRegistry) -> Result<()> {
            self.journal.lock().unwrap().push(format!("{}:init", self.name));
            Ok(())
        }

        async fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(LifecycleError::start_failed(self.name, "port in use"));
            }
            self.journal.lock().unwrap().push(format!("{}:start", self.name));
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.journal.lock().unwrap().push(format!("{}:stop", self.name));
            Ok(())
        }
    }

    fn config() -> AppConfig {
        AppConfig::load(&ConfigService::from_pairs([
            ("APP_NAME", "billing"),
            ("SHUTDOWN_TIMEOUT_SECS", "5"),
        ]))
        .unwrap()
    }

    fn recorder(name: &'static str, journal: &Journal) -> Recorder {
        Recorder {
            name,
            journal: journal.clone(),
            fail_start: false,
        }
    }

    #[tokio::test]
    async fn test_run_until_drives_full_lifecycle() {
        let journal = Journal::default();
        let app = Application::builder()
            .config(config())
            .startup_module(recorder("db", &journal))
            .startup_module(recorder("web", &journal))
            .build()
            .unwrap();

        app.run_until(async {}).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["db:init", "web:init", "db:start", "web:start", "web:stop", "db:stop"]
        );
        assert_eq!(
            app.orchestrator().module_state("db").await,
            Some(ModuleState::Stopped)
        );
        assert_eq!(app.orchestrator().module_names(), vec!["resources", "db", "web"]);
        assert_eq!(
            app.orchestrator().module_state("resources").await,
            Some(ModuleState::Stopped)
        );
    }

    #[tokio::test]
    async fn test_failed_start_stops_what_was_brought_up() {
        let (logs, _guard) = LogCapture::install();
        let journal = Journal::default();
        let mut broken = recorder("web", &journal);
        broken.fail_start = true;
        let app = Application::builder()
            .config(config())
            .startup_module(recorder("db", &journal))
            .startup_module(broken)
            .build()
            .unwrap();

        let err = app.run_until(async {}).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { .. }));
        assert!(journal.lock().unwrap().contains(&"db:stop".to_string()));
        assert!(logs.contains(Level::ERROR, "Application failed to start"));
    }

    #[tokio::test]
    async fn test_core_resources_are_registered() {
        let app = Application::builder().config(config()).build().unwrap();
        let report = app.initialize().await.unwrap();

        assert!(report.all_succeeded());
        let loaded = app.registry().resolve::<AppConfig>(tokens::CONFIG).unwrap();
        assert_eq!(loaded.app_name, "billing");
        let health = app.registry().resolve::<HealthRegistry>(tokens::HEALTH).unwrap();
        assert_eq!(health.get("cache").unwrap().status, HealthStatus::Degraded);
        assert_eq!(app.config().shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_later_registration_overrides_core() {
        let app = Application::builder()
            .config(config())
            .register(ResourceRegistration::value("greeting", "hello".to_string()))
            .register(ResourceRegistration::value("greeting", "hi".to_string()))
            .build()
            .unwrap();

        let greeting = app.registry().resolve::<String>("greeting").unwrap();
        assert_eq!(greeting.as_str(), "hi");
    }

    #[test]
    fn test_failing_singleton_fails_build() {
        let err = ApplicationBuilder::new()
            .config(config())
            .register(ResourceRegistration::singleton("broken", |_| -> anyhow::Result<u8> {
                anyhow::bail!("missing certificate")
            }))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing certificate"));
    }
}
