//! 캐시 항목.

use std::time::Duration;
use tokio::time::Instant;

/// 캐시된 값 하나와 그 메타데이터.
///
/// `expires_at`은 생성 시점에 `created_at + ttl`로 고정되며 이후 바뀌지 않습니다.
/// 새 TTL로 `set`하면 항목 자체가 교체됩니다.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
    access_count: u64,
    last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    /// 새 항목을 생성합니다. `ttl`이 `None`이면 만료되지 않습니다.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
            access_count: 0,
            last_accessed_at: now,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    /// `now` 시점에 만료되었는지 확인합니다.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// 남은 TTL. 만료되지 않는 항목은 `None`.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }

    /// 조회 기록을 남기고 값을 반환합니다.
    pub fn touch(&mut self) -> &V {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_fixed_at_creation() {
        let mut entry = CacheEntry::new("v", Some(Duration::from_secs(10)));
        let expires_at = entry.expires_at().unwrap();
        assert_eq!(expires_at, entry.created_at() + Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(5)).await;
        entry.touch();
        // 조회는 만료 시각을 연장하지 않음
        assert_eq!(entry.expires_at(), Some(expires_at));
        assert_eq!(entry.remaining_ttl(), Some(Duration::from_secs(5)));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_updates_access_metadata() {
        let mut entry = CacheEntry::new(42, None);
        let created = entry.created_at();
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(*entry.touch(), 42);
        assert_eq!(*entry.touch(), 42);
        assert_eq!(entry.access_count(), 2);
        assert!(entry.last_accessed_at() > created);
        assert!(!entry.is_expired());
        assert_eq!(entry.remaining_ttl(), None);
    }
}
