//! Well-known registry tokens for the core resources.

pub const CONFIG: &str = "config";
pub const HEALTH: &str = "health";
pub const STORE: &str = "store";
pub const CACHE: &str = "cache";
pub const QUEUE_BROKER: &str = "queueBroker";
