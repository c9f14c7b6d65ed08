//! Reconnecting client shared by the store and cache resources.

use super::{BackoffPolicy, ConnectError, Connector};
use crate::lifecycle::{HealthRegistry, HealthStatus};
use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResourceStatus {
    Disconnected,
    Connecting,
    Connected,
    /// No usable backend; operations answer with safe defaults.
    Degraded,
    /// Gave up connecting. Never retried.
    Failed,
}

/// What operations run against.
#[derive(Debug, Clone)]
pub enum Resource<T> {
    Connected(T),
    Degraded,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{resource} is not connected")]
    NotConnected { resource: String },

    #[error("{resource} rejected the connection: {source}")]
    Permanent {
        resource: String,
        #[source]
        source: ConnectError,
    },

    #[error("{resource} still unreachable after {attempts} attempts: {source}")]
    RetriesExhausted {
        resource: String,
        attempts: u32,
        #[source]
        source: ConnectError,
    },

    #[error("{resource} {operation} failed: {message}")]
    Operation {
        resource: String,
        operation: String,
        message: String,
    },

    #[error("Failed to close {resource}: {source}")]
    Close {
        resource: String,
        #[source]
        source: ConnectError,
    },
}

impl ResourceError {
    pub fn operation(
        resource: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            resource: resource.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

struct ClientState<C: Connector> {
    status: ResourceStatus,
    attempt: u32,
    connector: Option<C>,
    connection: Option<C::Connection>,
}

/// A connection to an external backend that retries until it succeeds.
///
/// Without configuration, or when the backend client cannot even be built, the
/// client settles in [`ResourceStatus::Degraded`] and callers get
/// [`Resource::Degraded`] so they can answer with defaults. Authentication
/// failures are never retried. Everything else is retried with the
/// [`BackoffPolicy`].
pub struct ReconnectingClient<C: Connector> {
    name: String,
    config: Option<C::Config>,
    policy: BackoffPolicy,
    state: RwLock<ClientState<C>>,
    connecting: Mutex<()>,
    health: Option<Arc<HealthRegistry>>,
}

impl<C: Connector> ReconnectingClient<C> {
    pub fn new(name: impl Into<String>, config: Option<C::Config>) -> Self {
        Self {
            name: name.into(),
            config,
            policy: BackoffPolicy::default(),
            state: RwLock::new(ClientState {
                status: ResourceStatus::Disconnected,
                attempt: 0,
                connector: None,
                connection: None,
            }),
            connecting: Mutex::new(()),
            health: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report status changes into a health registry.
    #[must_use]
    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub async fn status(&self) -> ResourceStatus {
        self.state.read().await.status
    }

    /// Failed attempts in the current (or last) connect run.
    pub async fn attempt(&self) -> u32 {
        self.state.read().await.attempt
    }

    /// Connect, retrying transient failures.
    ///
    /// Returns `Ok` once connected or degraded. Concurrent callers wait for the
    /// same run; calling it while connected does nothing.
    pub async fn connect(&self) -> Result<(), ResourceError> {
        let _connecting = self.connecting.lock().await;

        match self.status().await {
            ResourceStatus::Connected | ResourceStatus::Degraded => return Ok(()),
            ResourceStatus::Failed => {
                tracing::warn!("{} has failed permanently, not reconnecting", self.name);
                return Err(ResourceError::NotConnected {
                    resource: self.name.clone(),
                });
            }
            ResourceStatus::Disconnected | ResourceStatus::Connecting => {}
        }

        let Some(config) = &self.config else {
            tracing::warn!(
                resource = %self.name,
                "No configuration for {}, running in degraded mode",
                self.name
            );
            self.degrade("no configuration").await;
            return Ok(());
        };

        let connector = match C::build(config) {
            Ok(connector) => connector,
            Err(e) => {
                tracing::error!(
                    resource = %self.name,
                    "Failed to create {} client: {}. Falling back to degraded mode",
                    self.name,
                    e
                );
                self.degrade(e.to_string()).await;
                return Ok(());
            }
        };

        tracing::info!("Connecting to {}...", self.name);
        self.set_status(ResourceStatus::Connecting, 0, None).await;

        let mut attempt = 0u32;
        loop {
            match connector.connect().await {
                Ok(connection) => {
                    {
                        let mut state = self.state.write().await;
                        state.status = ResourceStatus::Connected;
                        state.attempt = attempt;
                        state.connector = Some(connector);
                        state.connection = Some(connection);
                    }
                    self.report(HealthStatus::Healthy, None);
                    tracing::info!("{} connection established.", self.name);
                    return Ok(());
                }
                Err(e) if e.is_permanent() => {
                    tracing::error!(
                        resource = %self.name,
                        code = e.code().unwrap_or_default(),
                        "Authentication to {} failed: {}",
                        self.name,
                        e
                    );
                    self.set_status(ResourceStatus::Failed, attempt, Some(e.to_string()))
                        .await;
                    return Err(ResourceError::Permanent {
                        resource: self.name.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    attempt += 1;
                    self.state.write().await.attempt = attempt;
                    tracing::warn!(resource = %self.name, "Attempt {} failed: {}", attempt, e);

                    if !self.policy.allows_retry_after(attempt) {
                        tracing::error!(
                            resource = %self.name,
                            "Giving up on {} after {} attempts",
                            self.name,
                            attempt
                        );
                        self.set_status(ResourceStatus::Failed, attempt, Some(e.to_string()))
                            .await;
                        return Err(ResourceError::RetriesExhausted {
                            resource: self.name.clone(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::info!("Waiting for {} ms before next attempt.", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Close the live connection, if any.
    pub async fn disconnect(&self) -> Result<(), ResourceError> {
        let mut state = self.state.write().await;
        match state.status {
            ResourceStatus::Degraded => {
                tracing::warn!("{} is in degraded mode, nothing to disconnect", self.name);
                Ok(())
            }
            ResourceStatus::Connected => {
                state.status = ResourceStatus::Disconnected;
                let connection = state.connection.take();
                let connector = state.connector.take();
                drop(state);

                if let (Some(connector), Some(connection)) = (connector, connection) {
                    connector
                        .close(connection)
                        .await
                        .map_err(|e| ResourceError::Close {
                            resource: self.name.clone(),
                            source: e,
                        })?;
                }
                tracing::info!("{} connection closed.", self.name);
                Ok(())
            }
            other => {
                tracing::debug!("{} is {}, nothing to disconnect", self.name, other);
                Ok(())
            }
        }
    }

    /// The live connection, or `Degraded` when running without a backend.
    pub async fn resource(&self) -> Result<Resource<C::Connection>, ResourceError> {
        let state = self.state.read().await;
        match (&state.status, &state.connection) {
            (ResourceStatus::Connected, Some(connection)) => {
                Ok(Resource::Connected(connection.clone()))
            }
            (ResourceStatus::Degraded, _) => Ok(Resource::Degraded),
            _ => Err(ResourceError::NotConnected {
                resource: self.name.clone(),
            }),
        }
    }

    async fn degrade(&self, reason: impl Into<String>) {
        self.set_status(ResourceStatus::Degraded, 0, Some(reason.into()))
            .await;
    }

    async fn set_status(&self, status: ResourceStatus, attempt: u32, detail: Option<String>) {
        {
            let mut state = self.state.write().await;
            state.status = status;
            state.attempt = attempt;
        }
        let health = match status {
            ResourceStatus::Connected => HealthStatus::Healthy,
            ResourceStatus::Degraded => HealthStatus::Degraded,
            ResourceStatus::Failed => HealthStatus::Failed,
            ResourceStatus::Connecting | ResourceStatus::Disconnected => HealthStatus::Starting,
        };
        self.report(health, detail);
    }

    fn report(&self, status: HealthStatus, detail: Option<String>) {
        if let Some(health) = &self.health {
            health.report(&self.name, status, detail);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted connector for exercising the retry loop.

    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    pub struct Script {
        pub outcomes: Arc<std::sync::Mutex<VecDeque<Result<u32, ConnectError>>>>,
        pub attempts: Arc<std::sync::Mutex<Vec<Instant>>>,
        pub builds: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
        pub build_error: Option<String>,
    }

    impl Script {
        pub fn new(outcomes: Vec<Result<u32, ConnectError>>) -> Self {
            Self {
                outcomes: Arc::new(std::sync::Mutex::new(outcomes.into())),
                ..Self::default()
            }
        }

        pub fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    pub struct ScriptedConnector {
        script: Script,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Config = Script;
        type Connection = u32;

        fn build(config: &Script) -> Result<Self, ConnectError> {
            config.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &config.build_error {
                return Err(ConnectError::transient(message.clone()));
            }
            Ok(Self {
                script: config.clone(),
            })
        }

        async fn connect(&self) -> Result<u32, ConnectError> {
            self.script.attempts.lock().unwrap().push(Instant::now());
            self.script
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(1))
        }

        async fn close(&self, _connection: u32) -> Result<(), ConnectError> {
            self.script.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
