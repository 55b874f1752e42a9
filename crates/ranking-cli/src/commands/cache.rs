//! 캐시 조회/무효화/헬스체크 명령.

use anyhow::{Context, Result};
use ranking_cache::{CacheValue, HierarchicalCache};
use tracing::info;

/// Shared Tier에서 패턴과 일치하는 키 목록.
pub async fn list_keys<V: CacheValue>(cache: &HierarchicalCache<V>, pattern: &str) -> Result<Vec<String>> {
    cache
        .shared_keys(pattern)
        .await
        .with_context(|| format!("Failed to list keys for '{}'", pattern))
}

/// 패턴들을 무효화한 후 삭제된 항목 수.
pub async fn invalidate<V: CacheValue>(cache: &HierarchicalCache<V>, patterns: &[String]) -> Result<usize> {
    let removed = cache
        .invalidate_patterns(patterns)
        .await
        .with_context(|| format!("Failed to invalidate {:?}", patterns))?;
    info!(patterns = ?patterns, removed, "Patterns invalidated");
    Ok(removed)
}

/// 헬스 리포트를 JSON 문자열로 반환합니다.
pub async fn health_report<V: CacheValue>(cache: &HierarchicalCache<V>) -> Result<String> {
    let health = cache.health_check().await;
    let report = serde_json::json!({
        "health": health,
        "stats": cache.stats().await,
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranking_cache::MemoryStore;
    use ranking_core::CacheConfig;
    use std::sync::Arc;

    fn cache() -> HierarchicalCache<serde_json::Value> {
        HierarchicalCache::new(CacheConfig::default(), Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_invalidate() {
        let cache = cache();
        cache
            .set("volume_ranking:count=20:market=KOSPI", serde_json::json!([1, 2]), None)
            .await
            .unwrap();

        assert_eq!(
            list_keys(&cache, "volume_ranking:*").await.unwrap(),
            vec!["volume_ranking:count=20:market=KOSPI".to_string()]
        );
        let patterns = vec!["volume_ranking:*".to_string()];
        assert_eq!(invalidate(&cache, &patterns).await.unwrap(), 2);
        assert!(list_keys(&cache, "*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_report_is_json() {
        let report = health_report(&cache()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["health"]["overall"], "healthy");
        assert_eq!(value["stats"]["requests"], 0);
    }
}
