//! Redis 기반 Shared Tier 저장소.
//!
//! 여러 서버 프로세스가 같은 캐시를 공유할 때 사용합니다. 만료는 Redis가
//! 직접 처리하므로 주기적 정리는 필요 없습니다.

use super::{SharedStore, StoredValue};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use ranking_core::RedisConfig;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Redis 연결 래퍼.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Redis에 연결합니다.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(config.url.as_str())?;
        let timeout = Duration::from_secs(config.connection_timeout_secs);
        let connection = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                CacheError::StorageUnavailable(format!(
                    "Redis connection timed out after {}s",
                    config.connection_timeout_secs
                ))
            })??;

        info!("Redis connection established");
        Ok(Self { connection })
    }
}

/// `PTTL` 응답을 남은 TTL로 변환합니다. -1은 만료 없음, -2는 키 없음.
fn pttl_to_remaining(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl SharedStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let mut conn = self.connection.clone();
        let (payload, pttl): (Option<String>, i64) = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| StoredValue {
            payload,
            remaining_ttl: pttl_to_remaining(pttl),
        }))
    }

    async fn set(&self, key: &str, payload: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection.clone();
        match ttl {
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                conn.pset_ex::<_, _, ()>(key, payload, millis).await?
            }
            None => conn.set::<_, _, ()>(key, payload).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut keys: Vec<String> = conn.keys(pattern).await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            debug!(pattern = %pattern, "Redis pattern delete: no keys matched");
            return Ok(0);
        }

        let deleted: i64 = conn.del(&keys).await?;
        Ok(deleted.max(0) as usize)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
