//! 계층형 캐시.
//!
//! Fast Tier(프로세스 내부 LRU)와 Shared Tier(TTL 공유 저장소)를 묶어 하나의
//! 캐시처럼 사용합니다.
//!
//! # 조회 흐름
//!
//! 1. Fast Tier 조회, 적중 시 즉시 반환
//! 2. Shared Tier 조회, 적중 시 Fast Tier로 승격 후 반환
//! 3. 둘 다 없으면 미스
//!
//! 읽기 경로(`get`, `exists`)의 저장소 오류는 미스로 처리되고, 쓰기 경로(`set`,
//! `delete`, `invalidate`)의 오류는 호출자에게 전달됩니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! let cache: HierarchicalCache<Vec<RankingItem>> =
//!     HierarchicalCache::from_config(&config.cache, &config.redis).await?;
//!
//! cache.set("volume_ranking:count=20:market=KOSPI", items, Some(15)).await?;
//! let cached = cache.get("volume_ranking:count=20:market=KOSPI").await;
//! ```

use crate::error::{CacheError, Result};
use crate::fast::FastTier;
use crate::pattern::KeyPattern;
use crate::shared::{MemoryStore, RedisStore, SharedStore, SharedTier};
use crate::stats::{CacheCounters, CacheHealth, CacheStats, TierHealth};
use ranking_core::{CacheConfig, RedisConfig, SharedBackend};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 캐시에 저장할 수 있는 값.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// 설정된 저장소 종류로 Shared Tier 저장소를 생성합니다.
pub async fn build_store(config: &CacheConfig, redis: &RedisConfig) -> Result<Arc<dyn SharedStore>> {
    match config.backend {
        SharedBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        SharedBackend::Redis => Ok(Arc::new(RedisStore::connect(redis).await?)),
    }
}

/// 2계층 캐시.
pub struct HierarchicalCache<V> {
    fast: FastTier<V>,
    shared: SharedTier<V>,
    config: CacheConfig,
    counters: CacheCounters,
}

impl<V: CacheValue> HierarchicalCache<V> {
    /// 주입된 저장소로 캐시를 생성합니다.
    ///
    /// Shared Tier가 활성화되어 있으면 만료 정리 작업을 시작하므로 tokio 런타임
    /// 안에서 호출해야 합니다.
    pub fn new(config: CacheConfig, store: Arc<dyn SharedStore>) -> Result<Self> {
        let fast = FastTier::new(config.fast_tier_max_size, config.fast_tier_default_ttl())?;
        let shared = if config.shared_tier_enabled {
            SharedTier::with_sweep(
                store,
                config.namespace.clone(),
                config.shared_tier_default_ttl(),
                config.sweep_interval(),
            )?
        } else {
            SharedTier::new(store, config.namespace.clone(), config.shared_tier_default_ttl())
        };

        info!(
            fast_tier = config.fast_tier_enabled,
            shared_tier = config.shared_tier_enabled,
            backend = shared.store().name(),
            namespace = %config.namespace,
            "Hierarchical cache initialized"
        );

        Ok(Self {
            fast,
            shared,
            config,
            counters: CacheCounters::default(),
        })
    }

    /// 설정에 따라 저장소를 연결하고 캐시를 생성합니다.
    pub async fn from_config(config: &CacheConfig, redis: &RedisConfig) -> Result<Self> {
        let store = build_store(config, redis).await?;
        Self::new(config.clone(), store)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fast Tier 직접 접근.
    pub fn fast_tier(&self) -> &FastTier<V> {
        &self.fast
    }

    /// Shared Tier 직접 접근.
    pub fn shared_tier(&self) -> &SharedTier<V> {
        &self.shared
    }

    /// 값을 조회합니다. 저장소 오류는 미스로 처리됩니다.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Option<V> {
        CacheCounters::incr(&self.counters.requests);

        if self.config.fast_tier_enabled {
            if let Some(value) = self.fast.get(key) {
                CacheCounters::incr(&self.counters.fast_hits);
                debug!(key = %key, tier = "fast", "Cache hit");
                return Some(value);
            }
            CacheCounters::incr(&self.counters.fast_misses);
        }

        if self.config.shared_tier_enabled {
            match self.shared.get_with_ttl(key).await {
                Ok(Some((value, remaining))) => {
                    CacheCounters::incr(&self.counters.shared_hits);
                    debug!(key = %key, tier = "shared", "Cache hit");
                    if self.config.fast_tier_enabled {
                        self.promote(key, &value, remaining);
                    }
                    return Some(value);
                }
                Ok(None) => {
                    CacheCounters::incr(&self.counters.shared_misses);
                }
                Err(e) => {
                    CacheCounters::incr(&self.counters.shared_misses);
                    warn!(key = %key, tier = "shared", error = %e, "Shared tier read failed, treating as miss");
                }
            }
        }

        debug!(key = %key, "Cache miss");
        None
    }

    /// Shared Tier 적중 값을 Fast Tier에 복사합니다.
    ///
    /// 승격 TTL은 설정값과 Shared Tier의 남은 TTL 중 짧은 쪽입니다.
    fn promote(&self, key: &str, value: &V, remaining: Option<Duration>) {
        let promotion_ttl = self.config.promotion_ttl();
        let ttl = remaining.map_or(promotion_ttl, |remaining| remaining.min(promotion_ttl));

        self.fast.set(key, value.clone(), Some(ttl));
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Promoted to fast tier");
    }

    /// 값을 저장합니다.
    ///
    /// `ttl_secs`가 `None`이면 각 계층의 기본 TTL을 사용합니다. 한 계층만 실패하면
    /// [`CacheError::PartialWrite`]를 반환하며 성공한 계층은 되돌리지 않습니다.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: V, ttl_secs: Option<u64>) -> Result<()> {
        let write_fast = self.config.fast_tier_enabled;
        let write_shared = self.config.shared_tier_enabled && self.config.write_through;

        if !write_fast && !write_shared {
            debug!(key = %key, "All tiers disabled, set skipped");
            return Ok(());
        }

        let ttl = ttl_secs.map(Duration::from_secs);

        let shared_result = if write_shared {
            let shared_ttl = ttl.unwrap_or_else(|| self.shared.default_ttl());
            Some(self.shared.set(key, &value, Some(shared_ttl)).await)
        } else {
            None
        };

        if write_fast {
            let fast_ttl = ttl.unwrap_or_else(|| self.fast.default_ttl());
            self.fast.set(key, value, Some(fast_ttl));
        }

        match shared_result {
            Some(Err(e)) if write_fast => {
                CacheCounters::incr(&self.counters.set_count);
                warn!(key = %key, tier = "shared", error = %e, "Shared tier write failed, fast tier kept");
                Err(CacheError::PartialWrite {
                    failed_tier: "shared",
                    source: Box::new(e),
                })
            }
            Some(Err(e)) => {
                warn!(key = %key, tier = "shared", error = %e, "Shared tier write failed");
                Err(e)
            }
            _ => {
                CacheCounters::incr(&self.counters.set_count);
                debug!(key = %key, ttl_secs = ?ttl_secs, "Cache set");
                Ok(())
            }
        }
    }

    /// 두 계층에서 키를 제거하고, 어느 한 계층에라도 있었는지 반환합니다.
    async fn remove(&self, key: &str) -> Result<bool> {
        let mut removed = false;

        if self.config.fast_tier_enabled {
            removed |= self.fast.delete(key);
        }

        if self.config.shared_tier_enabled {
            match self.shared.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(e) => {
                    warn!(key = %key, tier = "shared", error = %e, "Shared tier delete failed");
                    return Err(e);
                }
            }
        }

        Ok(removed)
    }

    /// 키를 삭제합니다. 없는 키를 삭제하면 `Ok(false)`입니다.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.remove(key).await?;
        if removed {
            CacheCounters::incr(&self.counters.delete_count);
            debug!(key = %key, "Cache delete");
        }
        Ok(removed)
    }

    /// 원본 데이터 변경으로 키를 무효화합니다.
    ///
    /// 동작은 [`delete`](Self::delete)와 같고 집계되는 카운터만 다릅니다.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.remove(key).await?;
        if removed {
            CacheCounters::incr(&self.counters.invalidation_count);
            debug!(key = %key, "Cache invalidated");
        }
        Ok(removed)
    }

    /// 패턴과 일치하는 키를 두 계층에서 무효화합니다.
    ///
    /// 반환값은 계층별 삭제 수의 합이므로 두 계층에 모두 있던 키는 두 번 집계됩니다.
    #[instrument(skip(self))]
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let matcher = KeyPattern::new(pattern)?;
        let mut total = 0;

        if self.config.fast_tier_enabled {
            total += self.fast.delete_matching(&matcher);
        }

        if self.config.shared_tier_enabled {
            match self.shared.delete_pattern(matcher.as_str()).await {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(pattern = %pattern, tier = "shared", error = %e, "Shared tier pattern delete failed");
                    CacheCounters::add(&self.counters.invalidation_count, total as u64);
                    return Err(e);
                }
            }
        }

        CacheCounters::add(&self.counters.invalidation_count, total as u64);
        debug!(pattern = %pattern, count = total, "Cache pattern invalidated");
        Ok(total)
    }

    /// 여러 패턴을 차례로 무효화하고 삭제 수를 합산합니다.
    ///
    /// [`KeyPolicy::invalidation_patterns`](crate::KeyPolicy::invalidation_patterns)가 만든
    /// 패턴 쌍을 그대로 넘길 수 있습니다. 앞 패턴에서 지워진 키는 뒤 패턴에서 다시
    /// 집계되지 않습니다.
    pub async fn invalidate_patterns<S: AsRef<str>>(&self, patterns: &[S]) -> Result<usize> {
        let mut total = 0;
        for pattern in patterns {
            total += self.invalidate_pattern(pattern.as_ref()).await?;
        }
        Ok(total)
    }

    /// 어느 계층에든 만료되지 않은 항목이 있는지 확인합니다.
    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> bool {
        if self.config.fast_tier_enabled && self.fast.exists(key) {
            return true;
        }

        if self.config.shared_tier_enabled {
            match self.shared.exists(key).await {
                Ok(exists) => return exists,
                Err(e) => {
                    warn!(key = %key, tier = "shared", error = %e, "Shared tier exists check failed");
                }
            }
        }

        false
    }

    /// 아직 캐시에 없는 항목만 기록하고 기록한 개수를 반환합니다.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn warm_cache(&self, entries: HashMap<String, V>) -> usize {
        let total = entries.len();
        let mut warmed = 0;

        for (key, value) in entries {
            if self.exists(&key).await {
                continue;
            }
            match self.set(&key, value, None).await {
                Ok(()) => warmed += 1,
                Err(e) => warn!(key = %key, error = %e, "Cache warming failed for key"),
            }
        }

        info!(warmed, total, "Cache warmed");
        warmed
    }

    /// 패턴과 일치하는 Shared Tier 키 목록.
    pub async fn shared_keys(&self, pattern: &str) -> Result<Vec<String>> {
        KeyPattern::new(pattern)?;
        self.shared.get_keys(pattern).await
    }

    pub async fn stats(&self) -> CacheStats {
        let fast = self.config.fast_tier_enabled.then(|| self.fast.stats());
        let shared = if self.config.shared_tier_enabled {
            Some(self.shared.stats().await)
        } else {
            None
        };
        self.counters.snapshot(fast, shared)
    }

    /// 모든 카운터를 0으로 되돌립니다.
    pub fn reset_stats(&self) {
        self.counters.reset();
        self.fast.reset_stats();
        self.shared.reset_stats();
    }

    pub async fn health_check(&self) -> CacheHealth {
        let fast = if self.config.fast_tier_enabled {
            TierHealth::Healthy
        } else {
            TierHealth::Disabled
        };

        let shared = if self.config.shared_tier_enabled {
            match self.shared.health_check().await {
                Ok(healthy) => TierHealth::from_check(healthy),
                Err(e) => {
                    warn!(tier = "shared", error = %e, "Shared tier health check failed");
                    TierHealth::Unhealthy
                }
            }
        } else {
            TierHealth::Disabled
        };

        CacheHealth::new(fast, shared, self.shared.store().name())
    }

    /// 활성화된 모든 계층을 비웁니다.
    pub async fn clear(&self) -> Result<()> {
        if self.config.fast_tier_enabled {
            self.fast.clear();
        }
        if self.config.shared_tier_enabled {
            let removed = self.shared.clear().await?;
            info!(removed, "Shared tier cleared");
        }
        Ok(())
    }

    /// 정리 작업을 멈추고 Fast Tier를 비웁니다.
    pub fn close(&self) {
        self.shared.close();
        self.fast.clear();
        info!("Hierarchical cache closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            namespace: "test".to_string(),
            ..CacheConfig::default()
        }
    }

    fn cache(config: CacheConfig) -> HierarchicalCache<String> {
        HierarchicalCache::new(config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_fast_hit_does_not_touch_shared() {
        let cache = cache(config());
        cache.set("k", "v".to_string(), None).await.unwrap();

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        let stats = cache.stats().await;
        assert_eq!(stats.fast_hits, 1);
        assert_eq!(stats.shared_hits, 0);
        assert_eq!(stats.shared_misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotion_ttl_capped_by_remaining_shared_ttl() {
        let cache = cache(config());
        cache
            .shared_tier()
            .set("k", &"v".to_string(), Some(Duration::from_secs(20)))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        // 승격 TTL(300초)이 아니라 남은 20초를 따름
        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(cache.fast_tier().get("k"), None);
    }

    #[tokio::test]
    async fn test_fast_disabled_reads_shared_only() {
        let cache = cache(CacheConfig {
            fast_tier_enabled: false,
            ..config()
        });
        cache.set("k", "v".to_string(), None).await.unwrap();

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert!(cache.fast_tier().is_empty());
        let stats = cache.stats().await;
        assert_eq!(stats.fast_misses, 0);
        assert_eq!(stats.shared_hits, 1);
        assert!(stats.fast_tier.is_none());
    }

    #[tokio::test]
    async fn test_write_through_disabled_keeps_shared_untouched() {
        let cache = cache(CacheConfig {
            write_through: false,
            ..config()
        });
        cache.set("k", "v".to_string(), None).await.unwrap();

        assert_eq!(cache.fast_tier().get("k").as_deref(), Some("v"));
        assert_eq!(cache.shared_tier().get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_tiers_disabled_set_is_noop() {
        let cache = cache(CacheConfig {
            fast_tier_enabled: false,
            shared_tier_enabled: false,
            ..config()
        });
        cache.set("k", "v".to_string(), None).await.unwrap();

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().await.set_count, 0);
    }

    #[tokio::test]
    async fn test_delete_and_invalidate_counters() {
        let cache = cache(config());
        cache.set("a", "1".to_string(), None).await.unwrap();
        cache.set("b", "2".to_string(), None).await.unwrap();

        assert!(cache.delete("a").await.unwrap());
        assert!(cache.invalidate("b").await.unwrap());
        assert!(!cache.invalidate("b").await.unwrap());

        let stats = cache.stats().await;
        assert_eq!(stats.set_count, 2);
        assert_eq!(stats.delete_count, 1);
        assert_eq!(stats.invalidation_count, 1);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_counts_both_tiers() {
        let cache = cache(config());
        cache.set("volume:kospi:1", "a".to_string(), None).await.unwrap();

        assert_eq!(cache.invalidate_pattern("volume:*").await.unwrap(), 2);
        assert_eq!(cache.stats().await.invalidation_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let cache = cache(config());
        let err = cache.invalidate_pattern("volume:[").await.unwrap_err();
        assert!(matches!(err, CacheError::KeyGeneration(_)));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let cache = cache(config());
        cache.set("k", "v".to_string(), None).await.unwrap();
        cache.get("k").await;
        cache.get("missing").await;
        cache.reset_stats();

        let stats = cache.stats().await;
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.set_count, 0);
        assert_eq!(stats.fast_tier.map(|s| s.hits), Some(0));
    }

    #[tokio::test]
    async fn test_health_check_and_clear() {
        let cache = cache(CacheConfig {
            fast_tier_enabled: false,
            ..config()
        });
        let health = cache.health_check().await;
        assert!(health.is_healthy());
        assert_eq!(health.fast_tier, TierHealth::Disabled);
        assert_eq!(health.shared_tier, TierHealth::Healthy);
        assert_eq!(health.backend, "memory");

        cache.set("k", "v".to_string(), None).await.unwrap();
        cache.clear().await.unwrap();
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_shared_keys_are_listed_without_namespace() {
        let cache = cache(config());
        cache.set("volume:kospi:1", "a".to_string(), None).await.unwrap();
        cache.set("cap:kospi:1", "b".to_string(), None).await.unwrap();

        assert_eq!(
            cache.shared_keys("volume:*").await.unwrap(),
            vec!["volume:kospi:1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_close_clears_fast_tier() {
        let cache = cache(config());
        cache.set("k", "v".to_string(), None).await.unwrap();
        cache.close();

        assert!(cache.fast_tier().is_empty());
        // Shared Tier 데이터는 남아 있어 다시 승격됨
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }
}
