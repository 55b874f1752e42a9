//! 순위 조회 결과용 계층형 캐시.
//!
//! 이 crate는 다음을 제공합니다:
//! - Fast Tier: 크기 제한 프로세스 내부 LRU 캐시
//! - Shared Tier: TTL 기반 공유 캐시 (메모리 / Redis 저장소)
//! - 거래시간 기반 TTL을 포함한 캐시 키 정책
//! - 두 계층을 묶는 계층형 캐시와 통계
//! - 비동기 조회 메모이제이션

pub mod entry;
pub mod error;
pub mod fast;
pub mod hierarchical;
pub mod key;
pub mod memoize;
pub mod pattern;
pub mod shared;
pub mod stats;

pub use error::{CacheError, Result};
pub use fast::{FastTier, FastTierStats};
pub use hierarchical::{build_store, CacheValue, HierarchicalCache};
pub use key::{hash_params, KeyParams, KeyPolicy, ParsedKey, RankingTool};
pub use memoize::{invalidate_after, warm_with, Memoized, Memoizer};
pub use pattern::KeyPattern;
pub use shared::{MemoryStore, RedisStore, SharedStore, SharedTier, SharedTierStats, StoredValue};
pub use stats::{CacheHealth, CacheStats, HealthStatus, TierHealth};
