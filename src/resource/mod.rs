//! External resources
//!
//! Clients for backends that live outside the process (relational store, cache).
//! Each one wraps a [`Connector`] in a [`ReconnectingClient`], which owns the
//! retry policy and falls back to degraded mode when the backend is not configured.

mod backoff;
pub mod cache;
mod client;
mod connector;
pub mod redis;
pub mod store;

pub use backoff::BackoffPolicy;
pub use cache::{CacheClient, CacheConnection};
pub use client::{ReconnectingClient, Resource, ResourceError, ResourceStatus};
pub use connector::{is_authentication_failure, ConnectError, Connector, FailureKind};
pub use self::redis::{RedisCache, RedisConnector};
pub use store::{DatabaseStore, StoreClient, StoreConnection};
