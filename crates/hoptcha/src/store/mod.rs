//! Attempt counter storage.
//!
//! The gate only needs integer counters with a TTL, so any key/value store
//! with expiry fits behind `CounterStore`.

use async_trait::async_trait;
use std::time::Duration;

use hoptcha_common::HoptchaError;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Key/value store holding attempt counters.
///
/// Each call is expected to be atomic on its own; nothing here makes a
/// read followed by a write atomic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `key`; absent or expired reads as 0
    async fn get(&self, key: &str) -> Result<u64, HoptchaError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), HoptchaError>;

    /// Remove `key` if present
    async fn delete(&self, key: &str) -> Result<(), HoptchaError>;

    /// Backend health check
    async fn ping(&self) -> Result<(), HoptchaError> {
        Ok(())
    }
}
