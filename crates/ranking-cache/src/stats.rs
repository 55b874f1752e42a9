//! 캐시 통계와 헬스 리포트.

use crate::fast::FastTierStats;
use crate::shared::SharedTierStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 계층형 캐시 카운터.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub requests: AtomicU64,
    pub fast_hits: AtomicU64,
    pub fast_misses: AtomicU64,
    pub shared_hits: AtomicU64,
    pub shared_misses: AtomicU64,
    pub set_count: AtomicU64,
    pub delete_count: AtomicU64,
    pub invalidation_count: AtomicU64,
}

impl CacheCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.fast_hits,
            &self.fast_misses,
            &self.shared_hits,
            &self.shared_misses,
            &self.set_count,
            &self.delete_count,
            &self.invalidation_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, fast: Option<FastTierStats>, shared: Option<SharedTierStats>) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let requests = load(&self.requests);
        let fast_hits = load(&self.fast_hits);
        let shared_hits = load(&self.shared_hits);
        let total_hits = fast_hits + shared_hits;

        CacheStats {
            requests,
            fast_hits,
            fast_misses: load(&self.fast_misses),
            shared_hits,
            shared_misses: load(&self.shared_misses),
            total_hits,
            total_misses: requests.saturating_sub(total_hits),
            hit_rate: if requests > 0 {
                total_hits as f64 / requests as f64
            } else {
                0.0
            },
            set_count: load(&self.set_count),
            delete_count: load(&self.delete_count),
            invalidation_count: load(&self.invalidation_count),
            fast_tier: fast,
            shared_tier: shared,
            timestamp: Utc::now(),
        }
    }
}

/// 계층형 캐시 통계 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// `get` 호출 횟수
    pub requests: u64,
    pub fast_hits: u64,
    pub fast_misses: u64,
    pub shared_hits: u64,
    pub shared_misses: u64,
    /// 어느 계층에서든 적중한 `get` 횟수
    pub total_hits: u64,
    /// 어느 계층에서도 찾지 못한 `get` 횟수
    pub total_misses: u64,
    /// 적중률 (0.0 ~ 1.0)
    pub hit_rate: f64,
    pub set_count: u64,
    pub delete_count: u64,
    pub invalidation_count: u64,
    /// 비활성화된 계층은 `None`
    pub fast_tier: Option<FastTierStats>,
    pub shared_tier: Option<SharedTierStats>,
    pub timestamp: DateTime<Utc>,
}

impl CacheStats {
    /// 백분율 적중률.
    pub fn hit_rate_percent(&self) -> f64 {
        self.hit_rate * 100.0
    }
}

/// 전체 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// 계층별 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierHealth {
    Disabled,
    Healthy,
    Unhealthy,
}

impl TierHealth {
    pub fn from_check(healthy: bool) -> Self {
        if healthy {
            TierHealth::Healthy
        } else {
            TierHealth::Unhealthy
        }
    }
}

/// 헬스체크 결과.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub overall: HealthStatus,
    pub fast_tier: TierHealth,
    pub shared_tier: TierHealth,
    /// Shared Tier 저장소 이름
    pub backend: String,
    pub timestamp: DateTime<Utc>,
}

impl CacheHealth {
    pub fn new(fast_tier: TierHealth, shared_tier: TierHealth, backend: impl Into<String>) -> Self {
        let overall = if fast_tier == TierHealth::Unhealthy || shared_tier == TierHealth::Unhealthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall,
            fast_tier,
            shared_tier,
            backend: backend.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall == HealthStatus::Healthy
    }
}
