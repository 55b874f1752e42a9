//! Fast Tier: 프로세스 내부 LRU 캐시.
//!
//! 최대 크기가 정해진 메모리 캐시로, 접근 순서(LRU)에 따라 항목을 내보냅니다.
//! 만료는 조회 시점에 지연 판정합니다. 내보내기와 순서 갱신은 하나의 잠금 안에서
//! 이루어지므로 동시 조회가 중간 상태를 보지 않습니다.

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::pattern::KeyPattern;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Fast Tier 통계.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FastTierStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// 크기 제한 LRU 계층.
pub struct FastTier<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> FastTier<V> {
    /// 새 계층을 생성합니다. `max_size`는 0보다 커야 합니다.
    pub fn new(max_size: usize, default_ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_size)
            .ok_or_else(|| CacheError::Config("fast tier max_size must be > 0".to_string()))?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 값을 저장합니다. 새 키이고 용량이 가득 찼으면 가장 오래 사용되지 않은 항목을 내보냅니다.
    ///
    /// `ttl`이 `None`이면 만료되지 않습니다.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl);
        let mut entries = self.entries.lock();

        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            // push는 같은 키를 교체한 경우에도 이전 값을 돌려줌
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "Fast tier evicted LRU entry");
            }
        }
        debug!(key = %key, ttl_secs = ?ttl.map(|t| t.as_secs()), "Fast tier set");
    }

    /// 기본 TTL로 값을 저장합니다.
    pub fn set_default(&self, key: &str, value: V) {
        self.set(key, value, Some(self.default_ttl));
    }

    /// 값을 조회합니다. 적중 시 가장 최근 위치로 옮기고 접근 횟수를 올립니다.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Fast tier entry expired");
            return None;
        }

        let value = entries.get_mut(key).map(|entry| entry.touch().clone());
        self.hits.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// 만료 여부만 확인합니다. LRU 순서는 바꾸지 않습니다.
    pub fn exists(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };

        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        !expired
    }

    /// 키를 삭제하고 존재했는지 여부를 반환합니다.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// 패턴과 일치하는 모든 키를 삭제합니다.
    ///
    /// 만료된 항목도 함께 정리하지만 반환값에는 살아 있던 항목만 셉니다.
    pub fn delete_matching(&self, pattern: &KeyPattern) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let matched: Vec<String> = entries
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();

        matched
            .iter()
            .filter_map(|key| entries.pop(key))
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    /// 저장된 키 목록 (최근 사용 순).
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn stats(&self) -> FastTierStats {
        let entries = self.entries.lock();
        FastTierStats {
            size: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}
