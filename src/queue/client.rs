//! Producer-side queue wrapper
//!
//! A [`QueueClient`] owns one named queue. Every operation checks that
//! [`QueueClient::init_queue`] has run and wraps backend errors with the queue
//! name and the failed operation.

use super::{Job, JobOptions, JobState, QueueBackend, QueueBroker, QueueEvent, QueueJob};
use crate::exception::{BackendResult, BoxError, QueueError};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Settings for [`QueueClient::init_queue`]
#[derive(Clone)]
pub struct QueueOptions {
    pub broker: Arc<dyn QueueBroker>,
    /// Applied to jobs added without their own options.
    pub default_job_options: JobOptions,
}

impl QueueOptions {
    pub fn new(broker: Arc<dyn QueueBroker>) -> Self {
        Self {
            broker,
            default_job_options: JobOptions::default(),
        }
    }

    #[must_use]
    pub fn default_job_options(mut self, options: JobOptions) -> Self {
        self.default_job_options = options;
        self
    }
}

struct QueueHandle {
    backend: Arc<dyn QueueBackend>,
    defaults: JobOptions,
    listener: JoinHandle<()>,
}

pub struct QueueClient {
    name: String,
    prefix: String,
    handle: RwLock<Option<QueueHandle>>,
}

impl QueueClient {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            prefix: format!("[Queue][{}]:", name),
            name,
            handle: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_initialized(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Open the queue and wait until it is ready. Calling it again is a no-op.
    pub async fn init_queue(&self, options: QueueOptions) -> Result<(), QueueError> {
        let mut handle = self.handle.write().await;
        if handle.is_some() {
            tracing::debug!("{} Queue {} already initialized", self.prefix, self.name);
            return Ok(());
        }

        let backend = match self.open(&options).await {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!(
                    queue = %self.name,
                    fatal = true,
                    "{} Failed to initialize queue {}: {}",
                    self.prefix,
                    self.name,
                    e
                );
                return Err(QueueError::init_failed(&self.name, e));
            }
        };

        let listener = tokio::spawn(log_events(self.prefix.clone(), backend.subscribe()));
        *handle = Some(QueueHandle {
            backend,
            defaults: options.default_job_options,
            listener,
        });
        tracing::info!("{} Queue {} initialized and ready.", self.prefix, self.name);
        Ok(())
    }

    async fn open(&self, options: &QueueOptions) -> BackendResult<Arc<dyn QueueBackend>> {
        let backend = options.broker.open(&self.name).await?;
        backend.wait_until_ready().await?;
        Ok(backend)
    }

    pub async fn add_job<T: Serialize + ?Sized>(
        &self,
        job_name: &str,
        data: &T,
        options: Option<JobOptions>,
    ) -> Result<Job, QueueError> {
        let data = serde_json::to_value(data)
            .map_err(|e| QueueError::operation_failed(&self.name, "add_job", e))?;
        self.with_queue("add_job", |backend, defaults| async move {
            let job = backend
                .add(job_name, data, options.unwrap_or(defaults))
                .await?;
            tracing::debug!("{} Added job {} ({})", self.prefix, job.id, job.name);
            Ok::<_, BoxError>(job)
        })
        .await
    }

    pub async fn add_bulk_job(&self, jobs: Vec<QueueJob>) -> Result<Vec<Job>, QueueError> {
        self.with_queue("add_bulk_job", |backend, defaults| async move {
            let entries = jobs
                .into_iter()
                .map(|job| {
                    let options = job.options.unwrap_or_else(|| defaults.clone());
                    (job.name, job.data, options)
                })
                .collect();
            let added = backend.add_bulk(entries).await?;
            tracing::info!(
                "{} Added {} jobs in bulk to {}",
                self.prefix,
                added.len(),
                self.name
            );
            Ok::<_, BoxError>(added)
        })
        .await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        self.with_queue("get_job", |backend, _| async move {
            let job = backend.get_job(job_id).await?;
            if job.is_none() {
                tracing::warn!("{} Job {} not found in {}", self.prefix, job_id, self.name);
            }
            Ok::<_, BoxError>(job)
        })
        .await
    }

    /// Returns `false` when the job does not exist.
    pub async fn remove_job(&self, job_id: &str) -> Result<bool, QueueError> {
        self.with_queue("remove_job", |backend, _| async move {
            let removed = backend.remove(job_id).await?;
            if removed {
                tracing::info!("{} Job {} removed from {}", self.prefix, job_id, self.name);
            } else {
                tracing::warn!(
                    "{} Cannot remove job {}: not found in {}",
                    self.prefix,
                    job_id,
                    self.name
                );
            }
            Ok::<_, BoxError>(removed)
        })
        .await
    }

    pub async fn pause(&self) -> Result<bool, QueueError> {
        self.with_queue("pause", |backend, _| async move {
            backend.pause().await?;
            tracing::info!("{} Queue {} paused successfully", self.prefix, self.name);
            Ok::<_, BoxError>(true)
        })
        .await
    }

    pub async fn resume(&self) -> Result<bool, QueueError> {
        self.with_queue("resume", |backend, _| async move {
            backend.resume().await?;
            tracing::info!("{} Queue {} resumed successfully", self.prefix, self.name);
            Ok::<_, BoxError>(true)
        })
        .await
    }

    /// Remove up to `limit` jobs in `state` older than `grace`. Returns how many went.
    pub async fn clean(
        &self,
        grace: Duration,
        limit: usize,
        state: JobState,
    ) -> Result<usize, QueueError> {
        self.with_queue("clean", |backend, _| async move {
            let removed = backend.clean(grace, limit, state).await?;
            tracing::info!(
                "{} Cleaned {} jobs from {}",
                self.prefix,
                removed.len(),
                self.name
            );
            Ok::<_, BoxError>(removed.len())
        })
        .await
    }

    /// Close the queue. A client that was never initialized has nothing to close.
    pub async fn close(&self) -> Result<bool, QueueError> {
        let Some(handle) = self.handle.write().await.take() else {
            return Ok(true);
        };
        handle.listener.abort();
        match handle.backend.close().await {
            Ok(()) => {
                tracing::info!("{} Queue {} closed successfully", self.prefix, self.name);
                Ok(true)
            }
            Err(e) => {
                tracing::error!("{} Failed to close queue {}: {}", self.prefix, self.name, e);
                Err(QueueError::with_cause(
                    format!("Failed to close queue {}", self.name),
                    e,
                ))
            }
        }
    }

    async fn with_queue<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(Arc<dyn QueueBackend>, JobOptions) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let (backend, defaults) = {
            let handle = self.handle.read().await;
            let Some(handle) = handle.as_ref() else {
                tracing::error!("{} Queue {} is not initialized", self.prefix, self.name);
                return Err(QueueError::not_initialized(&self.name));
            };
            (handle.backend.clone(), handle.defaults.clone())
        };

        f(backend, defaults).await.map_err(|e| {
            tracing::error!(
                queue = %self.name,
                "{} Error during {}: {}",
                self.prefix,
                operation,
                e
            );
            wrap(&self.name, operation, e)
        })
    }
}

fn wrap(queue: &str, operation: &str, error: BoxError) -> QueueError {
    match error.downcast::<QueueError>() {
        Ok(already) => *already,
        Err(error) => QueueError::operation_failed(queue, operation, error),
    }
}

async fn log_events(prefix: String, mut events: broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::Error { message }) => tracing::error!("{} Queue error: {}", prefix, message),
            Ok(QueueEvent::Waiting { job_id }) => tracing::debug!("{} Job {} is waiting", prefix, job_id),
            Ok(QueueEvent::Paused) => tracing::info!("{} Queue paused", prefix),
            Ok(QueueEvent::Resumed) => tracing::info!("{} Queue resumed", prefix),
            Ok(QueueEvent::Cleaned { count, state }) => {
                tracing::info!("{} Cleaned {} {} jobs", prefix, count, state)
            }
            Ok(QueueEvent::Completed { job_id }) => {
                tracing::debug!("{} Job {} completed", prefix, job_id)
            }
            Ok(QueueEvent::Failed { job_id, reason }) => {
                tracing::warn!("{} Job {} failed: {}", prefix, job_id, reason)
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("{} Event listener skipped {} events", prefix, skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryBroker;
    use crate::test_support::LogCapture;
    use async_trait::async_trait;
    use serde_json::json;
    use tracing::Level;

    struct UnreachableBroker;

    #[async_trait]
    impl QueueBroker for UnreachableBroker {
        async fn open(&self, queue: &str) -> BackendResult<Arc<dyn QueueBackend>> {
            Err(format!("connection refused opening {}", queue).into())
        }
    }

    async fn ready(name: &str) -> (QueueClient, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        let client = QueueClient::new(name);
        client
            .init_queue(QueueOptions::new(Arc::new(broker.clone())))
            .await
            .unwrap();
        (client, broker)
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let (logs, _guard) = LogCapture::install();
        let client = QueueClient::new("emails");

        let err = client.add_job("welcome", &json!({}), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Queue emails is not initialized");
        assert!(client.get_job("1").await.is_err());
        assert!(client.pause().await.is_err());
        assert!(logs.contains(Level::ERROR, "[Queue][emails]: Queue emails is not initialized"));
    }

    #[tokio::test]
    async fn test_init_queue_is_idempotent() {
        let (logs, _guard) = LogCapture::install();
        let (client, broker) = ready("emails").await;
        client
            .init_queue(QueueOptions::new(Arc::new(broker)))
            .await
            .unwrap();

        assert!(client.is_initialized().await);
        assert_eq!(logs.count(Level::INFO, "initialized and ready"), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_a_queue_error() {
        let client = QueueClient::new("emails");
        let err = client
            .init_queue(QueueOptions::new(Arc::new(UnreachableBroker)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Queue initialization failed for emails");
        assert!(err.detailed_message().contains("connection refused opening emails"));
        assert!(!client.is_initialized().await);
    }

    #[tokio::test]
    async fn test_add_and_fetch_jobs() {
        let (client, _broker) = ready("emails").await;
        let job = client
            .add_job("welcome", &json!({"user": 7}), None)
            .await
            .unwrap();

        let fetched = client.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "welcome");
        assert_eq!(fetched.data, json!({"user": 7}));
    }

    #[tokio::test]
    async fn test_default_job_options_apply() {
        let broker = InMemoryBroker::new();
        let client = QueueClient::new("emails");
        client
            .init_queue(
                QueueOptions::new(Arc::new(broker)).default_job_options(JobOptions::default().attempts(3)),
            )
            .await
            .unwrap();

        let defaulted = client.add_job("a", &1, None).await.unwrap();
        let explicit = client
            .add_job("b", &2, Some(JobOptions::default()))
            .await
            .unwrap();
        assert_eq!(defaulted.options.attempts, 3);
        assert_eq!(explicit.options.attempts, 1);
    }

    #[tokio::test]
    async fn test_bulk_add_logs_count() {
        let (logs, _guard) = LogCapture::install();
        let (client, _broker) = ready("emails").await;
        let jobs = client
            .add_bulk_job(vec![
                QueueJob::new("a", json!(1)),
                QueueJob::new("b", json!(2)),
            ])
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert!(logs.contains(Level::INFO, "Added 2 jobs in bulk to emails"));
    }

    #[tokio::test]
    async fn test_missing_job_is_none_with_warning() {
        let (logs, _guard) = LogCapture::install();
        let (client, _broker) = ready("emails").await;

        assert!(client.get_job("nope").await.unwrap().is_none());
        assert!(!client.remove_job("nope").await.unwrap());
        assert!(logs.contains(Level::WARN, "Job nope not found in emails"));
        assert!(logs.contains(Level::WARN, "Cannot remove job nope: not found in emails"));
    }

    #[tokio::test]
    async fn test_backend_errors_carry_queue_and_operation() {
        let (client, broker) = ready("emails").await;
        let job = client.add_job("a", &1, None).await.unwrap();
        let consumer = broker.open("emails").await.unwrap();
        consumer.next_job().await.unwrap().unwrap();

        let err = client.remove_job(&job.id).await.unwrap_err();
        assert!(err.to_string().starts_with("Queue emails operation remove_job failed"));
        assert!(err.cause_error().is_some());
    }

    #[tokio::test]
    async fn test_pause_resume_and_clean() {
        let (client, _broker) = ready("emails").await;
        client.add_job("a", &1, None).await.unwrap();
        client.add_job("b", &2, None).await.unwrap();

        assert!(client.pause().await.unwrap());
        assert!(client.resume().await.unwrap());
        assert_eq!(
            client.clean(Duration::ZERO, 0, JobState::Waiting).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_close() {
        let uninitialized = QueueClient::new("emails");
        assert!(uninitialized.close().await.unwrap());

        let (client, _broker) = ready("emails").await;
        assert!(client.close().await.unwrap());
        assert!(!client.is_initialized().await);
        assert!(client.add_job("a", &1, None).await.is_err());
    }
}
