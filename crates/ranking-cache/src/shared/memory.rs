//! 프로세스 내부 Shared Tier 저장소.

use super::{SharedStore, StoredValue};
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::pattern::KeyPattern;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// TTL 인덱스 메모리 저장소.
///
/// 크기 제한이 없으며 만료된 항목은 조회 시점 또는 `purge_expired`에서 삭제됩니다.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 만료 여부와 관계없이 저장된 항목 수.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let mut entries = self.entries.write();
        let now = Instant::now();

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            let payload = entry.touch().clone();
            StoredValue {
                payload,
                remaining_ttl: entry.remaining_ttl(),
            }
        }))
    }

    async fn set(&self, key: &str, payload: String, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry::new(payload, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(false),
        };
        if expired {
            entries.remove(key);
        }
        Ok(!expired)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = KeyPattern::new(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::new(pattern)?;
        let now = Instant::now();
        let mut entries = self.entries.write();

        let mut live_removed = 0;
        entries.retain(|key, entry| {
            if !pattern.matches(key) {
                return true;
            }
            if !entry.is_expired_at(now) {
                live_removed += 1;
            }
            false
        });
        Ok(live_removed)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before - entries.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
