//! Lifecycle-specific error types

use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Module or application initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A module failed to start
    #[error("Startup failed for {module}: {message}")]
    StartFailed {
        /// Name of the module that failed
        module: String,
        /// Error message
        message: String,
    },

    /// Shutdown operation failed
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    /// Operation timed out
    #[error("Timeout during {phase}: {message}")]
    Timeout {
        /// The lifecycle phase where timeout occurred
        phase: String,
        /// Additional error message
        message: String,
    },

    /// A module lifecycle call failed
    #[error("Module {module} failed: {message}")]
    ModuleFailed {
        /// Name of the module that failed
        module: String,
        /// Error message
        message: String,
    },
}

impl LifecycleError {
    /// Create an initialization failure error
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a start failure error
    pub fn start_failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StartFailed {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a shutdown failure error
    pub fn shutdown_failed(msg: impl Into<String>) -> Self {
        Self::ShutdownFailed(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create a module failure error
    pub fn module_failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleFailed {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
