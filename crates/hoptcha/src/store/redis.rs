//! Redis-backed counter store.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use hoptcha_common::HoptchaError;

use super::CounterStore;

/// Counter store on a shared Redis connection manager (auto-reconnecting)
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, HoptchaError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| HoptchaError::Config(format!("Invalid Redis URL: {e}")))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| HoptchaError::Store(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self { redis })
    }

    pub fn from_manager(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

// SETEX rejects a zero expiry
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn store_error(op: &str, e: redis::RedisError) -> HoptchaError {
    HoptchaError::Store(format!("Redis {op} failed: {e}"))
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<u64, HoptchaError> {
        let mut conn = self.redis.clone();
        let count: Option<u64> = conn.get(key).await.map_err(|e| store_error("GET", e))?;
        Ok(count.unwrap_or(0))
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), HoptchaError> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(|e| store_error("SETEX", e))
    }

    async fn delete(&self, key: &str) -> Result<(), HoptchaError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await.map_err(|e| store_error("DEL", e))
    }

    async fn ping(&self) -> Result<(), HoptchaError> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("PING", e))?;
        Ok(())
    }
}
