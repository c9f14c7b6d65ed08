use super::JobHandler;
use crate::exception::{BackendResult, WorkerError};
use crate::queue::{Job, QueueBackend, QueueBroker, QueueEvent};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;

const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Settings for [`WorkerDispatcher::init_worker`]
#[derive(Clone)]
pub struct WorkerOptions {
    pub broker: Arc<dyn QueueBroker>,
    /// Number of jobs processed at the same time.
    pub concurrency: usize,
}

impl WorkerOptions {
    pub fn new(broker: Arc<dyn QueueBroker>) -> Self {
        Self {
            broker,
            concurrency: num_cpus::get(),
        }
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

struct Handlers {
    name: String,
    prefix: String,
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

/// Routes jobs from one queue to the handler registered under the job's name
pub struct WorkerDispatcher {
    inner: Arc<Handlers>,
    running: Mutex<Option<Running>>,
}

impl WorkerDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(Handlers {
                prefix: format!("[Worker][{}]:", name),
                name,
                handlers: DashMap::new(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register `handler` for jobs called `job_name`. A later registration wins.
    pub fn register_job_handler<H: JobHandler>(&self, job_name: impl Into<String>, handler: H) {
        let job_name = job_name.into();
        if self
            .inner
            .handlers
            .insert(job_name.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!(
                "{} Handler for job {} is being overwritten",
                self.inner.prefix,
                job_name
            );
        }
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.handlers.iter().map(|h| h.key().clone()).collect();
        names.sort();
        names
    }

    /// Run the handler registered for `job.name`.
    pub async fn dispatch(&self, job: Job) -> Result<Value, WorkerError> {
        self.inner.dispatch(job).await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Attach to the queue and start consuming. Calling it again is a no-op.
    pub async fn init_worker(&self, options: WorkerOptions) -> Result<(), WorkerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("{} Worker already initialized", self.inner.prefix);
            return Ok(());
        }

        let backend = match open(&options, &self.inner.name).await {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!(
                    worker = %self.inner.name,
                    fatal = true,
                    "{} Failed to initialize worker: {}",
                    self.inner.prefix,
                    e
                );
                return Err(WorkerError::init_failed(&self.inner.name, e));
            }
        };

        let (shutdown, signal) = watch::channel(false);
        let mut tasks = JoinSet::new();
        tasks.spawn(log_errors(
            self.inner.prefix.clone(),
            backend.subscribe(),
            signal.clone(),
        ));
        for _ in 0..options.concurrency.max(1) {
            tasks.spawn(consume(self.inner.clone(), backend.clone(), signal.clone()));
        }

        *running = Some(Running { shutdown, tasks });
        tracing::info!(
            "{} Worker ready. Concurrency: {}",
            self.inner.prefix,
            options.concurrency.max(1)
        );
        Ok(())
    }

    /// Stop consuming. Jobs already being processed run to completion first.
    pub async fn close(&self) -> Result<(), WorkerError> {
        let Some(mut running) = self.running.lock().await.take() else {
            return Ok(());
        };
        let _ = running.shutdown.send(true);

        let mut panicked = 0;
        while let Some(result) = running.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    panicked += 1;
                }
            }
        }
        if panicked > 0 {
            return Err(WorkerError::new(format!(
                "{} consumer tasks of worker {} panicked",
                panicked, self.inner.name
            )));
        }
        tracing::info!("{} Worker closed.", self.inner.prefix);
        Ok(())
    }
}

impl Handlers {
    async fn dispatch(&self, job: Job) -> Result<Value, WorkerError> {
        tracing::info!("{} Processing Job {} ({})", self.prefix, job.id, job.name);

        let Some(handler) = self.handlers.get(&job.name).map(|h| h.value().clone()) else {
            tracing::error!(
                job_id = %job.id,
                job_name = %job.name,
                "{} No handler registered for job {}",
                self.prefix,
                job.name
            );
            return Err(WorkerError::no_handler(&job.name));
        };

        let (id, name) = (job.id.clone(), job.name.clone());
        let outcome = AssertUnwindSafe(handler.handle(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(format!("handler for {} panicked", name).into()));

        outcome.map_err(|e| {
            tracing::error!(
                job_id = %id,
                job_name = %name,
                "{} Error in handler {}: {}",
                self.prefix,
                name,
                e
            );
            WorkerError::processing_failed(&name, &id, e)
        })
    }
}

async fn open(options: &WorkerOptions, queue: &str) -> BackendResult<Arc<dyn QueueBackend>> {
    let backend = options.broker.open(queue).await?;
    backend.wait_until_ready().await?;
    Ok(backend)
}

async fn consume(
    handlers: Arc<Handlers>,
    backend: Arc<dyn QueueBackend>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = backend.next_job() => next,
        };

        match next {
            Ok(Some(job)) => process(&handlers, backend.as_ref(), job).await,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("{} Worker error: {}", handlers.prefix, e);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(FETCH_RETRY_DELAY) => {}
                }
            }
        }
    }
}

async fn process(handlers: &Handlers, backend: &dyn QueueBackend, job: Job) {
    let (id, name) = (job.id.clone(), job.name.clone());
    let acknowledged = match handlers.dispatch(job).await {
        Ok(value) => {
            tracing::info!("{} Job {} ({}) completed.", handlers.prefix, id, name);
            backend.complete(&id, value).await
        }
        Err(e) => {
            let reason = e
                .cause_error()
                .map(|cause| cause.to_string())
                .unwrap_or_else(|| e.to_string());
            tracing::error!("{} Job {} ({}) failed: {}", handlers.prefix, id, name, reason);
            backend.fail(&id, &reason).await
        }
    };
    if let Err(e) = acknowledged {
        tracing::error!(
            job_id = %id,
            "{} Could not acknowledge job {}: {}",
            handlers.prefix,
            id,
            e
        );
    }
}

async fn log_errors(
    prefix: String,
    mut events: broadcast::Receiver<QueueEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Ok(QueueEvent::Error { message }) => {
                    tracing::error!("{} Worker error: {}", prefix, message)
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
