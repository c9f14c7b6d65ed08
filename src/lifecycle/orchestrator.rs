//! Application Orchestrator
//!
//! Drives the registered startup modules through their lifecycle.

use super::{HookReport, InitHookExecutor, LifecycleError, ModuleState, Result, StartupModule};
use crate::di::ResourceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct ModuleSlot {
    module: Box<dyn StartupModule>,
    state: ModuleState,
}

struct ModuleEntry {
    name: String,
    slot: Arc<Mutex<ModuleSlot>>,
}

/// Ordered collection of startup modules
///
/// The orchestrator is responsible for:
/// - Keeping modules in registration order, keyed by name
/// - Initializing and starting them in that order
/// - Running the registry's on-ready hooks once every module is initialized
/// - Stopping them in reverse order, isolating failures
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::ApplicationOrchestrator;
///
/// let mut orchestrator = ApplicationOrchestrator::new(registry);
/// orchestrator.register_module(WebServerModule::new(addr));
/// orchestrator.register_module(JobsModule::new());
///
/// orchestrator.initialize().await?;
/// orchestrator.start().await?;
/// // ... application runs ...
/// orchestrator.stop().await;
/// ```
pub struct ApplicationOrchestrator {
    registry: ResourceRegistry,
    modules: Vec<ModuleEntry>,
}

impl ApplicationOrchestrator {
    /// Create an orchestrator bound to a registry
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
            modules: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Register a startup module
    ///
    /// A module whose name is already registered replaces the previous one and
    /// keeps its position.
    pub fn register_module<M>(&mut self, module: M)
    where
        M: StartupModule + 'static,
    {
        self.register_boxed(Box::new(module));
    }

    pub fn register_boxed(&mut self, module: Box<dyn StartupModule>) {
        let name = module.name().to_string();
        let slot = Arc::new(Mutex::new(ModuleSlot {
            module,
            state: ModuleState::Registered,
        }));

        match self.modules.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                tracing::warn!("Module {} is already registered, replacing it", name);
                entry.slot = slot;
            }
            None => {
                tracing::debug!("Registered module: {}", name);
                self.modules.push(ModuleEntry { name, slot });
            }
        }
    }

    /// Initialize every module in registration order, then run the on-ready hooks
    ///
    /// The first module that fails aborts initialization. Hook failures never do;
    /// they are reported in the returned [`HookReport`].
    pub async fn initialize(&self) -> Result<HookReport> {
        tracing::info!("Initializing {} modules...", self.modules.len());

        for entry in &self.modules {
            tracing::debug!("Initializing: {}", entry.name);
            let mut slot = entry.slot.lock().await;
            slot.module.initialize(&self.registry).await.map_err(|e| {
                tracing::error!("Initialization failed for {}: {}", entry.name, e);
                LifecycleError::module_failed(&entry.name, e.to_string())
            })?;
            slot.state = ModuleState::Initialized;
            tracing::debug!("Initialized: {}", entry.name);
        }

        let hooks = self.registry.take_on_ready_hooks();
        let report = InitHookExecutor::run(&self.registry, hooks).await;

        tracing::info!("Module initialization complete");
        Ok(report)
    }

    /// Initialize with an overall deadline
    pub async fn initialize_with_timeout(&self, timeout: Duration) -> Result<HookReport> {
        tokio::time::timeout(timeout, self.initialize())
            .await
            .map_err(|_| {
                LifecycleError::timeout("initialize", format!("Timeout after {:?}", timeout))
            })?
    }

    /// Start every module in registration order
    pub async fn start(&self) -> Result<()> {
        tracing::info!("Starting {} modules...", self.modules.len());

        for entry in &self.modules {
            let mut slot = entry.slot.lock().await;
            slot.module.start().await.map_err(|e| {
                tracing::error!("Start failed for {}: {}", entry.name, e);
                LifecycleError::start_failed(&entry.name, e.to_string())
            })?;
            slot.state = ModuleState::Started;
            tracing::info!("Started: {}", entry.name);
        }

        Ok(())
    }

    /// Stop every module in **reverse** registration order
    ///
    /// Each module is attempted regardless of earlier failures and ends up
    /// `Stopped`. Errors are logged with the module name, never returned.
    pub async fn stop(&self) {
        tracing::info!("Stopping {} modules...", self.modules.len());

        for entry in self.modules.iter().rev() {
            let mut slot = entry.slot.lock().await;
            if slot.state == ModuleState::Stopped {
                continue;
            }
            if let Err(e) = slot.module.stop().await {
                tracing::error!(module = %entry.name, "Failed to stop module {}: {}", entry.name, e);
            } else {
                tracing::debug!("Stopped: {}", entry.name);
            }
            slot.state = ModuleState::Stopped;
        }

        tracing::info!("All modules stopped");
    }

    /// Stop with an overall deadline
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.stop())
            .await
            .map_err(|_| {
                tracing::error!("Shutdown did not complete within {:?}", timeout);
                LifecycleError::timeout("stop", format!("Timeout after {:?}", timeout))
            })
    }

    /// Names in registration order
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub async fn module_state(&self, name: &str) -> Option<ModuleState> {
        let entry = self.modules.iter().find(|entry| entry.name == name)?;
        Some(entry.slot.lock().await.state)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{RegistryBuilder, ResourceRegistration};
    use crate::test_support::LogCapture;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::Level;

    type Journal = Arc<std::sync::Mutex<Vec<String>>>;

    struct Recorder {
        name: String,
        journal: Journal,
        fail_init: bool,
        fail_stop: bool,
        stop_delay: Option<Duration>,
    }

    impl Recorder {
        fn new(name: &str, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                journal: Arc::clone(journal),
                fail_init: false,
                fail_stop: false,
                stop_delay: None,
            }
        }

        fn record(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", event, self.name));
        }
    }

    #[async_trait]
    impl StartupModule for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&mut self, _registry: &ResourceRegistry) -> Result<()> {
            self.record("init");
            if self.fail_init {
                return Err(LifecycleError::init_failed("missing listener address"));
            }
            Ok(())
        }

        async fn start(&mut self) -> Result<()> {
            self.record("start");
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            if let Some(delay) = self.stop_delay {
                tokio::time::sleep(delay).await;
            }
            self.record("stop");
            if self.fail_stop {
                return Err(LifecycleError::shutdown_failed("socket already closed"));
            }
            Ok(())
        }
    }

    fn empty_registry() -> ResourceRegistry {
        RegistryBuilder::new().build().unwrap()
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let journal = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(empty_registry());
        for name in ["A", "B", "C"] {
            orchestrator.register_module(Recorder::new(name, &journal));
        }

        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();
        orchestrator.stop().await;

        assert_eq!(
            entries(&journal),
            vec![
                "init:A", "init:B", "init:C", "start:A", "start:B", "start:C", "stop:C", "stop:B",
                "stop:A"
            ]
        );
        assert_eq!(orchestrator.module_state("B").await, Some(ModuleState::Stopped));
    }

    #[tokio::test]
    async fn test_stop_failure_is_isolated() {
        let (logs, _guard) = LogCapture::install();
        let journal = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(empty_registry());
        orchestrator.register_module(Recorder::new("A", &journal));
        let mut failing = Recorder::new("B", &journal);
        failing.fail_stop = true;
        orchestrator.register_module(failing);
        orchestrator.register_module(Recorder::new("C", &journal));

        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();
        orchestrator.stop().await;

        let stops: Vec<_> = entries(&journal)
            .into_iter()
            .filter(|e| e.starts_with("stop"))
            .collect();
        assert_eq!(stops, vec!["stop:C", "stop:B", "stop:A"]);

        let logged = logs.find(Level::ERROR, "Failed to stop module B").unwrap();
        assert_eq!(logged.field("module"), Some("B"));
        for name in ["A", "B", "C"] {
            assert_eq!(
                orchestrator.module_state(name).await,
                Some(ModuleState::Stopped)
            );
        }
    }

    #[tokio::test]
    async fn test_duplicate_module_replaces_in_place() {
        let (logs, _guard) = LogCapture::install();
        let first = Journal::default();
        let second = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(empty_registry());
        orchestrator.register_module(Recorder::new("web", &first));
        orchestrator.register_module(Recorder::new("jobs", &first));
        orchestrator.register_module(Recorder::new("web", &second));

        assert_eq!(orchestrator.module_names(), vec!["web", "jobs"]);
        assert!(logs.contains(Level::WARN, "Module web is already registered"));

        orchestrator.initialize().await.unwrap();
        assert_eq!(entries(&first), vec!["init:jobs"]);
        assert_eq!(entries(&second), vec!["init:web"]);
    }

    #[tokio::test]
    async fn test_initialize_failure_aborts() {
        let journal = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(empty_registry());
        let mut failing = Recorder::new("A", &journal);
        failing.fail_init = true;
        orchestrator.register_module(failing);
        orchestrator.register_module(Recorder::new("B", &journal));

        let err = orchestrator.initialize().await.unwrap_err();
        assert!(matches!(err, LifecycleError::ModuleFailed { ref module, .. } if module == "A"));
        assert_eq!(entries(&journal), vec!["init:A"]);
        assert_eq!(
            orchestrator.module_state("B").await,
            Some(ModuleState::Registered)
        );
    }

    #[tokio::test]
    async fn test_initialize_runs_on_ready_hooks_after_modules() {
        let hook_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&hook_ran);
        let mut builder = RegistryBuilder::new();
        builder.register(ResourceRegistration::value("answer", 42u32).on_ready(move |_| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        }));

        let journal = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(builder.build().unwrap());
        orchestrator.register_module(Recorder::new("A", &journal));

        let report = orchestrator.initialize().await.unwrap();
        assert!(hook_ran.load(Ordering::SeqCst));
        assert_eq!(report.succeeded, vec!["answer".to_string()]);

        // Hooks are consumed by the first initialization.
        let again = orchestrator.initialize().await.unwrap();
        assert_eq!(again.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_timeout() {
        let journal = Journal::default();
        let mut orchestrator = ApplicationOrchestrator::new(empty_registry());
        let mut slow = Recorder::new("slow", &journal);
        slow.stop_delay = Some(Duration::from_secs(60));
        orchestrator.register_module(slow);

        let err = orchestrator
            .stop_with_timeout(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Timeout { .. }));
    }
}
