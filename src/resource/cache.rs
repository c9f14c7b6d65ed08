//! Namespaced JSON cache on top of a [`ReconnectingClient`].

use super::{Connector, ReconnectingClient, Resource, ResourceError, ResourceStatus};
use crate::config::KeyNamespace;
use crate::exception::BackendResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;

/// Raw key/value commands a cache backend connection supports.
#[async_trait]
pub trait CacheConnection: Clone + Send + Sync + 'static {
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, expire_seconds: Option<u64>)
        -> BackendResult<String>;
    async fn del(&self, key: &str) -> BackendResult<i64>;
    async fn unlink(&self, key: &str) -> BackendResult<i64>;
    async fn sadd(&self, key: &str, member: &str) -> BackendResult<i64>;
    async fn incrby(&self, key: &str, increment: i64) -> BackendResult<i64>;
    async fn expire(&self, key: &str, seconds: i64) -> BackendResult<i64>;
    async fn setnx(&self, key: &str, value: &str) -> BackendResult<i64>;
    async fn ping(&self) -> BackendResult<String>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> BackendResult<i64>;
    async fn hmset(&self, key: &str, fields: &[(String, String)]) -> BackendResult<String>;
    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>>;
}

/// Cache client
///
/// Keys are namespaced with the configured prefix and separator. Values are
/// stored as JSON and parsed back on read; anything that is not valid JSON is
/// returned as a plain string. While degraded every command answers with a
/// neutral default (`None`, `0`, `"OK"`, `"PONG"`, empty map) and logs a warning.
pub struct CacheClient<C: Connector>
where
    C::Connection: CacheConnection,
{
    client: ReconnectingClient<C>,
    keys: KeyNamespace,
}

impl<C: Connector> CacheClient<C>
where
    C::Connection: CacheConnection,
{
    pub fn new(client: ReconnectingClient<C>, keys: KeyNamespace) -> Self {
        Self { client, keys }
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

    /// Fully qualified key as stored in the backend.
    pub fn key(&self, key: &str) -> String {
        self.keys.key(key)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, ResourceError> {
        Ok(self.get_raw(key).await?.map(|raw| decode(&raw)))
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ResourceError> {
        match self.get(key).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ResourceError::operation(self.client.name(), "get", e.to_string())),
        }
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, ResourceError> {
        let key = self.key(key);
        self.run("get", None, |conn| async move { conn.get(&key).await })
            .await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expire_seconds: Option<u64>,
    ) -> Result<String, ResourceError> {
        let key = self.key(key);
        let value = self.encode("set", value)?;
        self.run("set", "OK".to_string(), |conn| async move {
            conn.set(&key, &value, expire_seconds).await
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Result<i64, ResourceError> {
        let key = self.key(key);
        self.run("del", 0, |conn| async move { conn.del(&key).await })
            .await
    }

    pub async fn unlink(&self, key: &str) -> Result<i64, ResourceError> {
        let key = self.key(key);
        self.run("unlink", 0, |conn| async move { conn.unlink(&key).await })
            .await
    }

    pub async fn sadd<T: Serialize + ?Sized>(
        &self,
        key: &str,
        member: &T,
    ) -> Result<i64, ResourceError> {
        let key = self.key(key);
        let member = self.encode_member("sadd", member)?;
        self.run("sadd", 0, |conn| async move { conn.sadd(&key, &member).await })
            .await
    }

    pub async fn incrby(&self, key: &str, increment: i64) -> Result<i64, ResourceError> {
        let key = self.key(key);
        self.run("incrby", 0, |conn| async move {
            conn.incrby(&key, increment).await
        })
        .await
    }

    pub async fn expire(&self, key: &str, seconds: i64) -> Result<i64, ResourceError> {
        let key = self.key(key);
        self.run("expire", 0, |conn| async move { conn.expire(&key, seconds).await })
            .await
    }

    pub async fn setnx<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<i64, ResourceError> {
        let key = self.key(key);
        let value = self.encode("setnx", value)?;
        self.run("setnx", 0, |conn| async move { conn.setnx(&key, &value).await })
            .await
    }

    pub async fn ping(&self) -> Result<String, ResourceError> {
        self.run("ping", "PONG".to_string(), |conn| async move { conn.ping().await })
            .await
    }

    pub async fn hset<T: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &T,
    ) -> Result<i64, ResourceError> {
        let key = self.key(key);
        let field = field.to_string();
        let value = self.encode_member("hset", value)?;
        self.run("hset", 0, |conn| async move {
            conn.hset(&key, &field, &value).await
        })
        .await
    }

    pub async fn hmset<I, F, T>(&self, key: &str, fields: I) -> Result<String, ResourceError>
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: Serialize,
    {
        let key = self.key(key);
        let fields = fields
            .into_iter()
            .map(|(field, value)| -> Result<(String, String), ResourceError> {
                Ok((field.into(), self.encode_member("hmset", &value)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.run("hmset", "OK".to_string(), |conn| async move {
            conn.hmset(&key, &fields).await
        })
        .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>, ResourceError> {
        let key = self.key(key);
        let raw = self
            .run("hgetall", HashMap::new(), |conn| async move {
                conn.hgetall(&key).await
            })
            .await?;
        Ok(raw
            .into_iter()
            .map(|(field, value)| (field, decode(&value)))
            .collect())
    }

    /// True when the backend answers `PONG`. Degraded clients report unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.client.resource().await {
            Ok(Resource::Connected(conn)) => matches!(conn.ping().await, Ok(reply) if reply == "PONG"),
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
                    "Cache unavailable, {} skipped and returned a default",
                    operation
                );
                Ok(fallback)
            }
            Resource::Connected(conn) => f(conn).await.map_err(|e| {
                tracing::error!(
                    resource = %self.client.name(),
                    "Cache {} failed: {}",
                    operation,
                    e
                );
                ResourceError::operation(self.client.name(), operation, e.to_string())
            }),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, operation: &str, value: &T) -> Result<String, ResourceError> {
        serde_json::to_string(value)
            .map_err(|e| ResourceError::operation(self.client.name(), operation, e.to_string()))
    }

    /// Strings are stored as-is, everything else as JSON.
    fn encode_member<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        value: &T,
    ) -> Result<String, ResourceError> {
        match serde_json::to_value(value) {
            Ok(Value::String(s)) => Ok(s),
            Ok(other) => Ok(other.to_string()),
            Err(e) => Err(ResourceError::operation(
                self.client.name(),
                operation,
                e.to_string(),
            )),
        }
    }
}

fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
