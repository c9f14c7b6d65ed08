//! Relational store client.

use crate::exception::BackendResult;
use super::{Connector, ReconnectingClient, Resource, ResourceError, ResourceStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Statements a store connection can run.
#[async_trait]
pub trait StoreConnection: Clone + Send + Sync + 'static {
    async fn ping(&self) -> BackendResult<()>;
    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> BackendResult<u64>;
    /// Run a query, returning each row as a JSON object.
    async fn query_all(&self, sql: &str) -> BackendResult<Vec<Value>>;
}

/// Store client
///
/// While degraded, `ping` answers `false`, `execute` answers `0` and
/// `query_all` answers an empty list.
pub struct StoreClient<C: Connector>
where
    C::Connection: StoreConnection,
{
    client: ReconnectingClient<C>,
}

impl<C: Connector> StoreClient<C>
where
    C::Connection: StoreConnection,
{
    pub fn new(client: ReconnectingClient<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ReconnectingClient<C> {
        &self.client
    }

    pub async fn connect(&self) -> Result<(), ResourceError> {
        self.client.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), ResourceError> {
        self.client.disconnect().await
    }

    pub async fn status(&self) -> ResourceStatus {
        self.client.status().await
    }

    pub async fn ping(&self) -> Result<bool, ResourceError> {
        self.run("ping", false, |conn| async move {
            conn.ping().await.map(|_| true)
        })
        .await
    }

    pub async fn execute(&self, sql: &str) -> Result<u64, ResourceError> {
        let sql = sql.to_string();
        self.run("execute", 0, |conn| async move { conn.execute(&sql).await })
            .await
    }

    pub async fn query_all(&self, sql: &str) -> Result<Vec<Value>, ResourceError> {
        let sql = sql.to_string();
        self.run("query_all", Vec::new(), |conn| async move {
            conn.query_all(&sql).await
        })
        .await
    }

    pub async fn health_check(&self) -> bool {
        match self.client.resource().await {
            Ok(Resource::Connected(conn)) => conn.ping().await.is_ok(),
            _ => false,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &str, fallback: T, f: F) -> Result<T, ResourceError>
    where
        F: FnOnce(C::Connection) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        match self.client.resource().await? {
            Resource::Degraded => {
                tracing::warn!(
                    resource = %self.client.name(),
                    "Store unavailable, {} skipped and returned a default",
                    operation
                );
                Ok(fallback)
            }
            Resource::Connected(conn) => f(conn).await.map_err(|e| {
                tracing::error!(resource = %self.client.name(), "Store {} failed: {}", operation, e);
                ResourceError::operation(self.client.name(), operation, e.to_string())
            }),
        }
    }
}

#[cfg(feature = "sea-orm-db")]
mod sea {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::resource::ConnectError;
    use sea_orm::{
        ConnectOptions, ConnectionTrait, Database, DatabaseConnection, FromQueryResult, JsonValue,
        Statement,
    };

    pub struct SeaOrmConnector {
        options: ConnectOptions,
    }

    #[async_trait]
    impl Connector for SeaOrmConnector {
        type Config = DatabaseConfig;
        type Connection = DatabaseConnection;

        fn build(config: &DatabaseConfig) -> Result<Self, ConnectError> {
            if !config.url.contains("://") {
                return Err(ConnectError::classify(
                    None,
                    format!("DATABASE_URL is not a connection URL: {}", config.url),
                ));
            }
            let mut options = ConnectOptions::new(config.url.clone());
            options
                .max_connections(config.max_connections)
                .sqlx_logging(false);
            Ok(Self { options })
        }

        async fn connect(&self) -> Result<DatabaseConnection, ConnectError> {
            Database::connect(self.options.clone())
                .await
                .map_err(|e| ConnectError::classify(None, e.to_string()))
        }

        async fn close(&self, connection: DatabaseConnection) -> Result<(), ConnectError> {
            connection
                .close()
                .await
                .map_err(|e| ConnectError::transient(e.to_string()))
        }
    }

    #[async_trait]
    impl StoreConnection for DatabaseConnection {
        async fn ping(&self) -> BackendResult<()> {
            Ok(DatabaseConnection::ping(self).await?)
        }

        async fn execute(&self, sql: &str) -> BackendResult<u64> {
            Ok(self.execute_unprepared(sql).await?.rows_affected())
        }

        async fn query_all(&self, sql: &str) -> BackendResult<Vec<Value>> {
            let statement = Statement::from_string(self.get_database_backend(), sql);
            Ok(JsonValue::find_by_statement(statement).all(self).await?)
        }
    }

    /// The store client used by the application.
    pub type DatabaseStore = StoreClient<SeaOrmConnector>;
}

#[cfg(feature = "sea-orm-db")]
pub use sea::{DatabaseStore, SeaOrmConnector};

#[cfg(not(feature = "sea-orm-db"))]
mod disabled {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::resource::ConnectError;
    use std::convert::Infallible;

    /// Stand-in used when the crate is built without a relational backend.
    ///
    /// Building it always fails, so a configured store settles in degraded mode.
    pub struct DisabledStoreConnector;

    #[async_trait]
    impl Connector for DisabledStoreConnector {
        type Config = DatabaseConfig;
        type Connection = Infallible;

        fn build(_config: &DatabaseConfig) -> Result<Self, ConnectError> {
            Err(ConnectError::transient(
                "built without a relational backend, enable the sea-orm-db feature",
            ))
        }

        async fn connect(&self) -> Result<Infallible, ConnectError> {
            Err(ConnectError::transient("no relational backend"))
        }

        async fn close(&self, connection: Infallible) -> Result<(), ConnectError> {
            match connection {}
        }
    }

    #[async_trait]
    impl StoreConnection for Infallible {
        async fn ping(&self) -> BackendResult<()> {
            match *self {}
        }

        async fn execute(&self, _sql: &str) -> BackendResult<u64> {
            match *self {}
        }

        async fn query_all(&self, _sql: &str) -> BackendResult<Vec<Value>> {
            match *self {}
        }
    }

    /// The store client used by the application.
    pub type DatabaseStore = StoreClient<DisabledStoreConnector>;
}

#[cfg(not(feature = "sea-orm-db"))]
pub use disabled::{DatabaseStore, DisabledStoreConnector};
