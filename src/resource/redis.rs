//! Redis cache backend
//!
//! Uses one multiplexed connection per client; it is cheap to clone and safe to
//! share between tasks.

use super::cache::{CacheClient, CacheConnection};
use crate::exception::BackendResult;
use super::{ConnectError, Connector};
use crate::config::RedisConfig;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::collections::HashMap;

/// The cache client used by the application.
pub type RedisCache = CacheClient<RedisConnector>;

pub struct RedisConnector {
    client: Client,
    connection_name: String,
}

impl RedisConnector {
    fn url(config: &RedisConfig) -> String {
        let auth = match &config.password {
            Some(password) => format!(":{}@", encode_userinfo(password)),
            None => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, config.host, config.port, config.db)
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Config = RedisConfig;
    type Connection = MultiplexedConnection;

    fn build(config: &RedisConfig) -> Result<Self, ConnectError> {
        let client = Client::open(Self::url(config))
            .map_err(|e| ConnectError::classify(None, format!("Invalid Redis configuration: {}", e)))?;
        Ok(Self {
            client,
            connection_name: config.connection_name.replace(char::is_whitespace, "-"),
        })
    }

    async fn connect(&self) -> Result<MultiplexedConnection, ConnectError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ConnectError::classify(None, e.to_string()))?;

        if let Err(e) = redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(&self.connection_name)
            .query_async::<()>(&mut conn)
            .await
        {
            tracing::debug!("Could not set Redis client name: {}", e);
        }
        Ok(conn)
    }

    async fn close(&self, connection: MultiplexedConnection) -> Result<(), ConnectError> {
        // The multiplexed driver shuts down once its last handle is dropped.
        drop(connection);
        Ok(())
    }
}

#[async_trait]
impl CacheConnection for MultiplexedConnection {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut conn = self.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: &str, expire_seconds: Option<u64>) -> BackendResult<String> {
        let mut conn = self.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(seconds) = expire_seconds {
            cmd.arg("EX").arg(seconds);
        }
        Ok(cmd.query_async(&mut conn).await?)
    }

    async fn del(&self, key: &str) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("DEL").arg(key).query_async(&mut conn).await?)
    }

    async fn unlink(&self, key: &str) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("UNLINK").arg(key).query_async(&mut conn).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?)
    }

    async fn incrby(&self, key: &str, increment: i64) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("INCRBY")
            .arg(key)
            .arg(increment)
            .query_async(&mut conn)
            .await?)
    }

    async fn expire(&self, key: &str, seconds: i64) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?)
    }

    async fn setnx(&self, key: &str, value: &str) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?)
    }

    async fn ping(&self) -> BackendResult<String> {
        let mut conn = self.clone();
        Ok(redis::cmd("PING").query_async(&mut conn).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> BackendResult<i64> {
        let mut conn = self.clone();
        Ok(redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?)
    }

    async fn hmset(&self, key: &str, fields: &[(String, String)]) -> BackendResult<String> {
        let mut conn = self.clone();
        let mut cmd = redis::cmd("HMSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        Ok(cmd.query_async(&mut conn).await?)
    }

    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>> {
        let mut conn = self.clone();
        Ok(redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?)
    }
}

fn encode_userinfo(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
