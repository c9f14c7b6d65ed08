use async_trait::async_trait;
use strum_macros::Display;
use thiserror::Error;

/// Error codes that mean the credentials were rejected.
const AUTH_FAILURE_CODES: &[&str] = &["P1000", "28P01", "28000", "WRONGPASS", "NOAUTH"];

/// Server replies that carry the failure code inside the message text.
const AUTH_FAILURE_MARKERS: &[&str] = &["WRONGPASS", "NOAUTH"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailureKind {
    /// Retrying cannot help (bad credentials).
    Permanent,
    /// Network or availability problem, worth retrying.
    Transient,
}

/// A failed attempt to build, open or close a backend connection.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectError {
    kind: FailureKind,
    code: Option<String>,
    message: String,
}

impl ConnectError {
    /// Build an error, classifying it from its code and message.
    pub fn classify(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_authentication_failure(code, &message) {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        };
        Self {
            kind,
            code: code.map(str::to_string),
            message,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            code: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn is_authentication_failure(code: Option<&str>, message: &str) -> bool {
    if code.is_some_and(|code| AUTH_FAILURE_CODES.contains(&code)) {
        return true;
    }
    if AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        return true;
    }
    message.to_lowercase().contains("authentication")
}

/// A backend the [`ReconnectingClient`](super::ReconnectingClient) knows how to open.
///
/// `build` turns configuration into a client object without touching the
/// network; `connect` performs one connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + Sized + 'static {
    type Config: Send + Sync + 'static;
    type Connection: Clone + Send + Sync + 'static;

    fn build(config: &Self::Config) -> Result<Self, ConnectError>;

    async fn connect(&self) -> Result<Self::Connection, ConnectError>;

    async fn close(&self, connection: Self::Connection) -> Result<(), ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures_are_permanent() {
        assert!(ConnectError::classify(Some("P1000"), "credentials rejected").is_permanent());
        assert!(ConnectError::classify(Some("28P01"), "password mismatch").is_permanent());
        assert!(ConnectError::classify(None, "WRONGPASS invalid username-password pair").is_permanent());
        assert!(ConnectError::classify(None, "Authentication failed for user app").is_permanent());
        assert!(ConnectError::classify(None, "password authentication failed").is_permanent());
    }

    #[test]
    fn test_other_failures_are_transient() {
        let err = ConnectError::classify(Some("ECONNREFUSED"), "connection refused");
        assert_eq!(err.kind(), FailureKind::Transient);
        assert_eq!(err.code(), Some("ECONNREFUSED"));
        assert!(!ConnectError::classify(None, "timed out").is_permanent());
        assert!(!ConnectError::classify(None, "connection to db:28000 refused").is_permanent());
    }
}
