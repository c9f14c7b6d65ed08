//! Queues and workers as a startup module

use crate::config::AppConfig;
use crate::di::{ResourceRegistry, tokens};
use crate::lifecycle::{LifecycleError, StartupModule};
use crate::queue::{JobOptions, QueueBroker, QueueClient, QueueOptions};
use crate::worker::{WorkerDispatcher, WorkerOptions};
use async_trait::async_trait;
use std::sync::Arc;

const MODULE_NAME: &str = "jobs";

/// Owns a set of queue clients and worker dispatchers
///
/// `initialize` opens the queues so producers can enqueue as soon as the
/// application is initialized. Workers only start consuming in `start`.
/// `stop` closes workers before queues so in-flight jobs can still be
/// acknowledged.
#[derive(Default)]
pub struct JobsModule {
    queues: Vec<Arc<QueueClient>>,
    workers: Vec<Arc<WorkerDispatcher>>,
    default_job_options: JobOptions,
    concurrency: Option<usize>,
    broker: Option<Arc<dyn QueueBroker>>,
}

impl JobsModule {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn queue(mut self, queue: Arc<QueueClient>) -> Self {
        self.queues.push(queue);
        self
    }

    #[must_use]
    pub fn worker(mut self, worker: Arc<WorkerDispatcher>) -> Self {
        self.workers.push(worker);
        self
    }

    #[must_use]
    pub fn default_job_options(mut self, options: JobOptions) -> Self {
        self.default_job_options = options;
        self
    }

    /// Consumers per worker. Falls back to `WORKER_CONCURRENCY`.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    fn broker(&self) -> Result<Arc<dyn QueueBroker>, LifecycleError> {
        self.broker
            .clone()
            .ok_or_else(|| LifecycleError::start_failed(MODULE_NAME, "jobs module not initialized"))
    }
}

#[async_trait]
impl StartupModule for JobsModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn initialize(&mut self, registry: &ResourceRegistry) -> Result<(), LifecycleError> {
        let broker = registry
            .resolve::<Arc<dyn QueueBroker>>(tokens::QUEUE_BROKER)
            .map_err(|e| LifecycleError::init_failed(format!("Jobs module needs a queue broker: {}", e)))?;
        let broker: Arc<dyn QueueBroker> = broker.as_ref().clone();

        if self.concurrency.is_none() {
            if let Ok(config) = registry.resolve::<AppConfig>(tokens::CONFIG) {
                self.concurrency = Some(config.worker_concurrency);
            }
        }

        for queue in &self.queues {
            let options =
                QueueOptions::new(broker.clone()).default_job_options(self.default_job_options.clone());
            queue
                .init_queue(options)
                .await
                .map_err(|e| LifecycleError::init_failed(e.detailed_message()))?;
        }

        self.broker = Some(broker);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LifecycleError> {
        let broker = self.broker()?;
        for worker in &self.workers {
            let mut options = WorkerOptions::new(broker.clone());
            if let Some(concurrency) = self.concurrency {
                options = options.concurrency(concurrency);
            }
            worker
                .init_worker(options)
                .await
                .map_err(|e| LifecycleError::start_failed(MODULE_NAME, e.detailed_message()))?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        for worker in &self.workers {
            if let Err(e) = worker.close().await {
                failures.push(e.to_string());
            }
        }
        for queue in &self.queues {
            if let Err(e) = queue.close().await {
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
