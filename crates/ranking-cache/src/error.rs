//! 캐시 모듈 오류 타입.

use thiserror::Error;

/// 캐시 관련 오류.
#[derive(Debug, Error)]
pub enum CacheError {
    /// 저장소에 연결하거나 기록할 수 없음
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// 값 인코딩/디코딩 실패
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 파라미터로부터 캐시 키를 만들 수 없음
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// 잘못된 캐시 설정
    #[error("Configuration error: {0}")]
    Config(String),

    /// 일부 계층만 기록에 성공
    #[error("Write to {failed_tier} tier failed: {source}")]
    PartialWrite {
        failed_tier: &'static str,
        #[source]
        source: Box<CacheError>,
    },
}

impl CacheError {
    /// 저장소 계열 오류인지 확인합니다.
    ///
    /// 호출자 입장에서 직렬화 오류와 저장소 오류는 동일하게 취급됩니다.
    pub fn is_storage_failure(&self) -> bool {
        match self {
            CacheError::StorageUnavailable(_) | CacheError::Serialization(_) => true,
            CacheError::PartialWrite { source, .. } => source.is_storage_failure(),
            _ => false,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<ranking_core::ConfigError> for CacheError {
    fn from(err: ranking_core::ConfigError) -> Self {
        CacheError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
