use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConductorError>;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Dependency not found: {token}")]
    DependencyNotFound { token: String },

    #[error("Failed to downcast dependency '{token}' to {type_name}")]
    DowncastFailed { token: String, type_name: String },

    #[error("Scope mismatch: {message}")]
    ScopeMismatch { message: String },

    #[error("Resource construction failed for '{token}': {message}")]
    ConstructionFailed { token: String, message: String },
}

impl ConductorError {
    pub fn not_found(token: impl Into<String>) -> Self {
        Self::DependencyNotFound {
            token: token.into(),
        }
    }

    pub fn downcast_failed<T: ?Sized>(token: impl Into<String>) -> Self {
        Self::DowncastFailed {
            token: token.into(),
            type_name: std::any::type_name::<T>().to_string(),
        }
    }
}
