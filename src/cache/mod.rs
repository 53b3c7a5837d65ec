//! Key-value counter/cache store.
//!
//! The budget guard and the leaderboard cache only need atomic increment,
//! expiry, get/set and delete, so both run against this trait. Production
//! uses Redis; without `REDIS_URL` (and in tests) the in-process store is
//! used instead.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add 1 and return the new value (missing keys start at 0).
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Expire the key after `ttl`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Read a key holding an integer counter.
pub async fn get_counter(store: &dyn CounterStore, key: &str) -> Result<Option<i64>, StoreError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
