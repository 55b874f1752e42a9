//! Shared Tier: TTL 기반 공유 캐시 계층.
//!
//! 여러 프로세스가 함께 쓰는 외부 저장소를 모델링합니다. 실제 저장은
//! [`SharedStore`] 구현체가 담당하고, [`SharedTier`]는 값 타입 직렬화,
//! 네임스페이스 접두사, 주기적 만료 정리를 맡습니다.
//!
//! - [`MemoryStore`]: 프로세스 내부 저장소 (테스트 및 단일 프로세스 배포용)
//! - [`RedisStore`]: Redis 저장소

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 저장소에서 읽은 직렬화된 값.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub payload: String,
    /// 남은 TTL. 만료되지 않는 항목은 `None`.
    pub remaining_ttl: Option<Duration>,
}

/// Shared Tier가 의존하는 저장소 인터페이스.
///
/// 키는 네임스페이스가 이미 적용된 전체 키입니다.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// 저장소 이름 (로그용).
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<StoredValue>>;

    /// 값을 저장합니다. `ttl`이 `None`이면 만료되지 않습니다.
    async fn set(&self, key: &str, payload: String, ttl: Option<Duration>) -> Result<()>;

    /// 키를 삭제하고 존재했는지 여부를 반환합니다.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// 글롭 패턴과 일치하는 키 목록.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// 패턴과 일치하는 키를 저장소 고유 방식으로 삭제합니다.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    /// 만료된 항목을 정리합니다. 자체 만료를 지원하는 저장소는 아무것도 하지 않습니다.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<bool>;
}

/// Shared Tier 통계.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SharedTierStats {
    /// 네임스페이스 안의 키 개수 (조회 실패 시 `None`)
    pub size: Option<usize>,
    /// 실행된 정리 횟수
    pub sweeps: u64,
    /// 정리로 삭제된 항목 수
    pub swept_entries: u64,
}

#[derive(Default)]
struct SweepCounters {
    sweeps: AtomicU64,
    swept: AtomicU64,
}

/// 값 타입 `V`를 JSON으로 저장하는 공유 계층.
pub struct SharedTier<V> {
    store: Arc<dyn SharedStore>,
    namespace: String,
    default_ttl: Duration,
    counters: Arc<SweepCounters>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> SharedTier<V>
where
    V: Serialize + DeserializeOwned,
{
    /// 정리 작업 없이 계층을 생성합니다.
    pub fn new(store: Arc<dyn SharedStore>, namespace: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            default_ttl,
            counters: Arc::new(SweepCounters::default()),
            sweeper: Mutex::new(None),
            _value: PhantomData,
        }
    }

    /// 계층을 생성하고 `interval`마다 만료 항목을 정리하는 백그라운드 작업을 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn with_sweep(
        store: Arc<dyn SharedStore>,
        namespace: impl Into<String>,
        default_ttl: Duration,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(CacheError::Config("sweep interval must be > 0".to_string()));
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Config("shared tier sweep requires a tokio runtime".to_string())
        })?;

        let tier = Self::new(store, namespace, default_ttl);
        let task = handle.spawn(sweep_loop(
            Arc::clone(&tier.store),
            Arc::clone(&tier.counters),
            interval,
        ));
        *tier.sweeper.lock() = Some(task);

        info!(
            store = tier.store.name(),
            interval_secs = interval.as_secs(),
            "Shared tier expiry sweep started"
        );
        Ok(tier)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    fn full_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    fn strip_namespace<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        if self.namespace.is_empty() {
            return Some(full_key);
        }
        full_key
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }

    /// 값을 조회합니다.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.get_with_ttl(key).await?.map(|(value, _)| value))
    }

    /// 값과 남은 TTL을 함께 조회합니다.
    pub async fn get_with_ttl(&self, key: &str) -> Result<Option<(V, Option<Duration>)>> {
        match self.store.get(&self.full_key(key)).await? {
            Some(stored) => {
                let value = serde_json::from_str(&stored.payload)?;
                Ok(Some((value, stored.remaining_ttl)))
            }
            None => Ok(None),
        }
    }

    /// 값을 저장합니다. `ttl`이 `None`이면 만료되지 않습니다.
    pub async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.store.set(&self.full_key(key), payload, ttl).await
    }

    /// 기본 TTL로 값을 저장합니다.
    pub async fn set_default(&self, key: &str, value: &V) -> Result<()> {
        self.set(key, value, Some(self.default_ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.full_key(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.store.exists(&self.full_key(key)).await
    }

    /// 패턴과 일치하는 키 목록 (네임스페이스 제외).
    pub async fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let keys = self.store.keys(&self.full_key(pattern)).await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.strip_namespace(key))
            .map(str::to_string)
            .collect())
    }

    /// 패턴과 일치하는 키를 삭제합니다.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        self.store.delete_pattern(&self.full_key(pattern)).await
    }

    /// 만료 항목을 즉시 정리합니다.
    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self.store.purge_expired().await?;
        self.counters.swept.fetch_add(purged as u64, Ordering::Relaxed);
        Ok(purged)
    }

    /// 네임스페이스 안의 모든 키를 삭제합니다.
    pub async fn clear(&self) -> Result<usize> {
        self.delete_pattern("*").await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }

    pub async fn stats(&self) -> SharedTierStats {
        let size = match self.store.keys(&self.full_key("*")).await {
            Ok(keys) => Some(keys.len()),
            Err(e) => {
                warn!(error = %e, "Shared tier size lookup failed");
                None
            }
        };
        SharedTierStats {
            size,
            sweeps: self.counters.sweeps.load(Ordering::Relaxed),
            swept_entries: self.counters.swept.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.sweeps.store(0, Ordering::Relaxed);
        self.counters.swept.store(0, Ordering::Relaxed);
    }

    /// 백그라운드 정리 작업을 중지합니다.
    pub fn close(&self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
            info!(store = self.store.name(), "Shared tier expiry sweep stopped");
        }
    }
}

impl<V> Drop for SharedTier<V> {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.abort();
        }
    }
}

async fn sweep_loop(store: Arc<dyn SharedStore>, counters: Arc<SweepCounters>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // 첫 tick은 즉시 반환되므로 건너뜀
    ticker.tick().await;

    loop {
        ticker.tick().await;
        counters.sweeps.fetch_add(1, Ordering::Relaxed);

        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => {
                counters.swept.fetch_add(purged as u64, Ordering::Relaxed);
                debug!(store = store.name(), purged, "Shared tier swept expired entries");
            }
            Err(e) => warn!(store = store.name(), error = %e, "Shared tier sweep failed"),
        }
    }
}
