//! Storage layer
//!
//! Provides the Redis key layout, the transition scripts and the client
//! binding that runs them.

pub mod keys;
pub mod redis;
pub mod scripts;

pub use keys::QueueKeys;
pub use redis::{KeyspaceSubscription, RedisClient, RedisConfig};
