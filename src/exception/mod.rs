//! Error envelope shared by the queue and worker wrappers
//!
//! Every error raised by a [`QueueClient`](crate::queue::QueueClient) or a
//! [`WorkerDispatcher`](crate::worker::WorkerDispatcher) is an [`ErrorEnvelope`]: a stable
//! message plus the original error as its cause. Callers match on the wrapper type
//! and read [`ErrorEnvelope::detailed_message`] for diagnostics.

use std::error::Error as StdError;
use std::ops::Deref;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result of a raw backend call, before it is wrapped for callers.
pub type BackendResult<T> = Result<T, BoxError>;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ErrorEnvelope {
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// The message followed by up to two levels of causes.
    pub fn detailed_message(&self) -> String {
        let mut detailed = self.message.clone();
        if let Some(cause) = &self.cause {
            detailed.push_str(&format!("\nCaused by: {}", cause));
            if let Some(original) = cause.source() {
                detailed.push_str(&format!("\nOriginal cause: {}", original));
            }
        }
        detailed
    }
}

/// Error raised by queue operations.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct QueueError(ErrorEnvelope);

impl QueueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(ErrorEnvelope::new(message))
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self(ErrorEnvelope::with_cause(message, cause))
    }

    pub fn not_initialized(queue: &str) -> Self {
        Self::new(format!("Queue {} is not initialized", queue))
    }

    pub fn init_failed(queue: &str, cause: impl Into<BoxError>) -> Self {
        Self::with_cause(format!("Queue initialization failed for {}", queue), cause)
    }

    pub fn operation_failed(queue: &str, operation: &str, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self::with_cause(
            format!("Queue {} operation {} failed: {}", queue, operation, cause),
            cause,
        )
    }

    pub fn into_envelope(self) -> ErrorEnvelope {
        self.0
    }
}

impl Deref for QueueError {
    type Target = ErrorEnvelope;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Error raised by job dispatch and worker setup.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct WorkerError(ErrorEnvelope);

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(ErrorEnvelope::new(message))
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self(ErrorEnvelope::with_cause(message, cause))
    }

    pub fn no_handler(job_name: &str) -> Self {
        Self::new(format!("No handler registered for job \"{}\"", job_name))
    }

    pub fn processing_failed(job_name: &str, job_id: &str, cause: impl Into<BoxError>) -> Self {
        Self::with_cause(
            format!("Failed to process job {} (ID: {})", job_name, job_id),
            cause,
        )
    }

    pub fn init_failed(worker: &str, cause: impl Into<BoxError>) -> Self {
        Self::with_cause(format!("Worker init failed for {}", worker), cause)
    }

    pub fn into_envelope(self) -> ErrorEnvelope {
        self.0
    }
}

impl Deref for WorkerError {
    type Target = ErrorEnvelope;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("socket closed")]
    struct Root;

    #[derive(Debug, Error)]
    #[error("redis write failed")]
    struct Middle(#[source] Root);

    #[test]
    fn test_detailed_message_walks_three_levels() {
        let err = WorkerError::processing_failed("email", "42", Middle(Root));
        assert_eq!(err.to_string(), "Failed to process job email (ID: 42)");
        assert_eq!(
            err.detailed_message(),
            "Failed to process job email (ID: 42)\nCaused by: redis write failed\nOriginal cause: socket closed"
        );
        assert_eq!(err.cause_error().unwrap().to_string(), "redis write failed");
    }

    #[test]
    fn test_detailed_message_without_cause() {
        let err = QueueError::not_initialized("emails");
        assert_eq!(err.detailed_message(), "Queue emails is not initialized");
        assert!(err.cause_error().is_none());
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let err = QueueError::operation_failed("emails", "add_job", "backend offline");
        assert_eq!(
            err.to_string(),
            "Queue emails operation add_job failed: backend offline"
        );
        let source = StdError::source(&err).unwrap();
        assert_eq!(source.to_string(), "backend offline");
    }
}
