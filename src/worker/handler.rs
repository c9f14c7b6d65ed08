use crate::exception::BoxError;
use crate::queue::Job;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Processes one kind of job
///
/// Any `Fn(Job) -> impl Future<Output = Result<Value, E>>` is a handler, so a
/// plain async closure can be registered directly.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job) -> Result<Value, BoxError>;
}

#[async_trait]
impl<F, Fut, E> JobHandler for F
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn handle(&self, job: Job) -> Result<Value, BoxError> {
        (self)(job).await.map_err(Into::into)
    }
}
