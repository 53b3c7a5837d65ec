use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::CounterStore;
use crate::error::StoreError;

/// Redis-backed store. Every command is bounded by `op_timeout` so a hung
/// server surfaces as `StoreError::Timeout` instead of stalling the caller.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))??;
        info!("Connected to Redis counter store");
        Ok(RedisCounterStore { conn, op_timeout })
    }

    async fn run<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        let value: i64 = self.run(cmd.query_async(&mut conn)).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl.as_secs().max(1));
        let _: () = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<String> = self.run(cmd.query_async(&mut conn)).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1));
        let _: () = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let _: () = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
