//! Environment-backed configuration.

use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Configuration service
///
/// A snapshot of key/value settings, loaded from the process environment.
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::from_pairs(env::vars())
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let service = Self::default();
        for (key, value) in pairs {
            service.set(key.as_ref(), value.as_ref());
        }
        service
    }

    /// Value for `key`. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        self.config
            .get(key)
            .map(|v| v.clone())
            .filter(|v| !v.trim().is_empty())
    }

    /// Value for `key` exactly as set, empty values included.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    value,
                    reason: e.to_string(),
                }),
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AppEnv {
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Reported to the server as the client name.
    pub connection_name: String,
}

/// Namespace applied to every cache key: `{prefix}{separator}{key}`.
///
/// An empty prefix leaves keys untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    pub prefix: String,
    pub separator: String,
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self {
            prefix: "app".to_string(),
            separator: ":".to_string(),
        }
    }
}

impl KeyNamespace {
    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        format!("{}{}{}", self.prefix, self.separator, key)
    }
}

/// Typed application settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub env: AppEnv,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub cache_keys: KeyNamespace,
    pub connect_max_attempts: Option<u32>,
    pub shutdown_timeout: Duration,
    pub worker_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&ConfigService::new())
    }

    pub fn load(config: &ConfigService) -> Result<Self, ConfigError> {
        let app_name = config.get_or("APP_NAME", "conductor");

        let database = match config.get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: config.parse("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            }),
            None => None,
        };

        let redis = match config.get("REDIS_HOST") {
            Some(host) => Some(RedisConfig {
                host,
                port: config.parse("REDIS_PORT")?.unwrap_or(6379),
                password: config.get("REDIS_PASSWORD"),
                db: config.parse("REDIS_DB")?.unwrap_or(0),
                connection_name: app_name.clone(),
            }),
            None => None,
        };

        let connect_max_attempts: Option<u32> = config.parse("CONNECT_MAX_ATTEMPTS")?;
        if connect_max_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                key: "CONNECT_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        let defaults = KeyNamespace::default();
        let cache_keys = KeyNamespace {
            prefix: config.get_raw("REDIS_KEY_PREFIX").unwrap_or(defaults.prefix),
            separator: config
                .get_raw("REDIS_KEY_SEPARATOR")
                .unwrap_or(defaults.separator),
        };

        Ok(Self {
            app_name,
            env: config.parse("APP_ENV")?.unwrap_or(AppEnv::Production),
            host: config.get_or("HOST", "0.0.0.0"),
            port: config.parse("PORT")?.unwrap_or(3000),
            log_level: config.get_or("LOG_LEVEL", "info"),
            database,
            redis,
            cache_keys,
            connect_max_attempts,
            shutdown_timeout: Duration::from_secs(
                config.parse("SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            worker_concurrency: config
                .parse("WORKER_CONCURRENCY")?
                .unwrap_or_else(num_cpus::get)
                .max(1),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_backends() {
        let config = AppConfig::load(&ConfigService::from_pairs([("PORT", "8080")])).unwrap();
        assert_eq!(config.app_name, "conductor");
        assert_eq!(config.env, AppEnv::Production);
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert!(config.database.is_none());
        assert!(config.redis.is_none());
        assert_eq!(config.cache_keys.key("user:1"), "app:user:1");
        assert_eq!(config.connect_max_attempts, None);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.worker_concurrency >= 1);
    }

    #[test]
    fn test_backends_from_env() {
        let config = AppConfig::load(&ConfigService::from_pairs([
            ("APP_NAME", "billing"),
            ("APP_ENV", "Development"),
            ("DATABASE_URL", "postgres://app@db/app"),
            ("REDIS_HOST", "cache"),
            ("REDIS_PASSWORD", ""),
            ("REDIS_KEY_PREFIX", "billing"),
            ("REDIS_KEY_SEPARATOR", "/"),
            ("CONNECT_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.env, AppEnv::Development);
        assert_eq!(config.database.unwrap().max_connections, 10);
        let redis = config.redis.unwrap();
        assert_eq!(redis.port, 6379);
        assert_eq!(redis.password, None);
        assert_eq!(redis.connection_name, "billing");
        assert_eq!(config.cache_keys.key("k"), "billing/k");
        assert_eq!(config.connect_max_attempts, Some(5));
    }

    #[test]
    fn test_empty_key_prefix_leaves_keys_bare() {
        let config =
            AppConfig::load(&ConfigService::from_pairs([("REDIS_KEY_PREFIX", "")])).unwrap();
        assert_eq!(config.cache_keys.prefix, "");
        assert_eq!(config.cache_keys.key("user:1"), "user:1");
    }

    #[test]
    fn test_zero_connect_attempts_is_rejected() {
        let err = AppConfig::load(&ConfigService::from_pairs([("CONNECT_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "CONNECT_MAX_ATTEMPTS")
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::load(&ConfigService::from_pairs([("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "PORT"));
    }
}
