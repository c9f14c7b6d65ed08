//! Queue backend contract
//!
//! A [`QueueBroker`] opens named queues. Each [`QueueBackend`] serves both the
//! producer side (used by [`QueueClient`](super::QueueClient)) and the consumer
//! side (used by [`WorkerDispatcher`](crate::worker::WorkerDispatcher)).

use super::{Job, JobOptions, JobState};
use crate::exception::BackendResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Lifecycle notifications published by a queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Error { message: String },
    Waiting { job_id: String },
    Paused,
    Resumed,
    Cleaned { count: usize, state: JobState },
    Completed { job_id: String },
    Failed { job_id: String, reason: String },
}

#[async_trait]
pub trait QueueBroker: Send + Sync + 'static {
    async fn open(&self, queue: &str) -> BackendResult<Arc<dyn QueueBackend>>;
}

#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn wait_until_ready(&self) -> BackendResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<QueueEvent>;

    async fn add(&self, name: &str, data: Value, options: JobOptions) -> BackendResult<Job>;

    async fn add_bulk(&self, jobs: Vec<(String, Value, JobOptions)>) -> BackendResult<Vec<Job>>;

    async fn get_job(&self, job_id: &str) -> BackendResult<Option<Job>>;

    async fn remove(&self, job_id: &str) -> BackendResult<bool>;

    async fn pause(&self) -> BackendResult<()>;

    async fn resume(&self) -> BackendResult<()>;

    /// Remove up to `limit` jobs in `state` older than `grace` (0 means no limit).
    async fn clean(&self, grace: Duration, limit: usize, state: JobState)
        -> BackendResult<Vec<String>>;

    async fn close(&self) -> BackendResult<()>;

    /// Wait for the next runnable job. `None` once the queue is closed.
    ///
    /// Must be cancel safe: dropping the future never loses a job.
    async fn next_job(&self) -> BackendResult<Option<Job>>;

    async fn complete(&self, job_id: &str, result: Value) -> BackendResult<()>;

    async fn fail(&self, job_id: &str, reason: &str) -> BackendResult<()>;
}
