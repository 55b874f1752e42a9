//! 비동기 조회 결과 메모이제이션.
//!
//! 조회 함수를 감싸 결과를 계층형 캐시에 저장합니다. 캐시는 최선 노력(best-effort)으로만
//! 동작하며, 키 생성이나 캐시 기록이 실패해도 조회 결과는 그대로 호출자에게 전달됩니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! let memoizer = Memoizer::new(cache.clone(), policy.clone());
//! let volume_ranking = memoizer
//!     .memoize(RankingTool::VolumeRanking.as_str())
//!     .condition(|items: &Vec<RankingItem>| !items.is_empty());
//!
//! let items = volume_ranking
//!     .call(&RankingTool::volume_ranking("KOSPI", 20), || client.fetch_volume_ranking("KOSPI", 20))
//!     .await?;
//! ```

use crate::error::{CacheError, Result};
use crate::hierarchical::{CacheValue, HierarchicalCache};
use crate::key::{KeyParams, KeyPolicy, KEY_DELIMITER};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

type Condition<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// 메모이제이션 래퍼 생성기.
pub struct Memoizer<V> {
    cache: Arc<HierarchicalCache<V>>,
    policy: Arc<KeyPolicy>,
}

impl<V> Clone for Memoizer<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<V: CacheValue> Memoizer<V> {
    pub fn new(cache: Arc<HierarchicalCache<V>>, policy: Arc<KeyPolicy>) -> Self {
        Self { cache, policy }
    }

    pub fn cache(&self) -> &Arc<HierarchicalCache<V>> {
        &self.cache
    }

    pub fn policy(&self) -> &Arc<KeyPolicy> {
        &self.policy
    }

    /// `operation` 이름으로 캐시되는 조회 래퍼를 만듭니다.
    pub fn memoize(&self, operation: impl Into<String>) -> Memoized<V> {
        Memoized {
            cache: Arc::clone(&self.cache),
            policy: Arc::clone(&self.policy),
            operation: operation.into(),
            ttl_secs: None,
            condition: None,
            key_prefix: None,
        }
    }
}

/// 하나의 작업에 대한 캐시 래퍼.
pub struct Memoized<V> {
    cache: Arc<HierarchicalCache<V>>,
    policy: Arc<KeyPolicy>,
    operation: String,
    ttl_secs: Option<u64>,
    condition: Option<Condition<V>>,
    key_prefix: Option<String>,
}

impl<V: CacheValue> Memoized<V> {
    /// 고정 TTL (초). 지정하지 않으면 키 정책이 거래시간에 따라 계산합니다.
    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    /// 결과를 캐시할지 결정하는 조건. `false`면 결과는 반환되지만 저장되지 않습니다.
    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// 작업 이름 앞에 붙는 키 접두사.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// 파라미터에 해당하는 캐시 키.
    pub fn cache_key(&self, params: &KeyParams) -> String {
        match &self.key_prefix {
            Some(prefix) => {
                let base = format!("{}{}{}", prefix, KEY_DELIMITER, self.operation);
                self.policy.build_key(&base, params)
            }
            None => self.policy.build_key(&self.operation, params),
        }
    }

    /// 저장에 사용할 TTL (초).
    pub fn effective_ttl(&self) -> u64 {
        self.ttl_secs
            .unwrap_or_else(|| self.policy.compute_ttl(&self.operation, None))
    }

    /// 캐시를 거쳐 조회합니다.
    pub async fn call<F, Fut, E>(&self, params: &KeyParams, fetch: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = self.cache_key(params);
        self.run(Ok(key), fetch).await
    }

    /// 키 파라미터를 직접 추출하는 함수로 캐시를 거쳐 조회합니다.
    ///
    /// `key_fn`이 실패하면 캐시 없이 `fetch`만 실행합니다.
    pub async fn call_with<K, F, Fut, E>(&self, key_fn: K, fetch: F) -> std::result::Result<V, E>
    where
        K: FnOnce() -> Result<KeyParams>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = key_fn().map(|params| self.cache_key(&params));
        self.run(key, fetch).await
    }

    #[instrument(skip_all, fields(operation = %self.operation))]
    async fn run<F, Fut, E>(&self, key: Result<String>, fetch: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = match key.and_then(validated) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Cache key generation failed, calling without cache");
                return fetch().await;
            }
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, "Memoized call served from cache");
            return Ok(cached);
        }

        debug!(key = %key, "Memoized call cache miss");
        let value = fetch().await?;

        if let Some(condition) = &self.condition {
            if !condition(&value) {
                debug!(key = %key, "Result rejected by cache condition");
                return Ok(value);
            }
        }

        let ttl = self.effective_ttl();
        if let Err(e) = self.cache.set(&key, value.clone(), Some(ttl)).await {
            warn!(key = %key, error = %e, "Failed to cache memoized result");
        }
        Ok(value)
    }

    /// 파라미터에 해당하는 캐시 항목을 무효화합니다.
    pub async fn invalidate(&self, params: &KeyParams) -> Result<bool> {
        let key = self.cache_key(params);
        let invalidated = self.cache.invalidate(&key).await?;
        if invalidated {
            debug!(key = %key, "Memoized entry invalidated");
        } else {
            debug!(key = %key, "Memoized entry not found");
        }
        Ok(invalidated)
    }
}

fn validated(key: String) -> Result<String> {
    if KeyPolicy::validate_key(&key) {
        Ok(key)
    } else {
        Err(CacheError::KeyGeneration(format!("invalid cache key '{}'", key)))
    }
}

/// 원본 데이터를 갱신한 뒤 관련 캐시 키를 무효화합니다.
///
/// 무효화 실패는 로그만 남기고 갱신 결과를 그대로 반환합니다.
pub async fn invalidate_after<V, Fut, T>(cache: &HierarchicalCache<V>, key: &str, update: Fut) -> T
where
    V: CacheValue,
    Fut: Future<Output = T>,
{
    let output = update.await;
    if let Err(e) = cache.invalidate(key).await {
        warn!(key = %key, error = %e, "Invalidation after update failed");
    }
    output
}

/// 시작 시 로더가 돌려준 항목으로 캐시를 미리 채웁니다.
///
/// 로더가 실패하면 에러를 기록하고 0을 반환합니다. 시작 자체는 막지 않습니다.
pub async fn warm_with<V, F, Fut, E>(cache: &HierarchicalCache<V>, loader: F) -> usize
where
    V: CacheValue,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<HashMap<String, V>, E>>,
    E: fmt::Display,
{
    match loader().await {
        Ok(entries) if entries.is_empty() => 0,
        Ok(entries) => {
            let warmed = cache.warm_cache(entries).await;
            info!(warmed, "Cache warmed on startup");
            warmed
        }
        Err(e) => {
            error!(error = %e, "Cache warming on startup failed");
            0
        }
    }
}
