//! # Ranking Core
//!
//! 순위 조회 서버 전반에서 공유하는 기반 기능을 제공합니다:
//! - 설정 관리 (파일 + 환경 변수)
//! - tracing 로깅 초기화
//! - 거래소 거래시간(세션) 판별

pub mod config;
pub mod logging;
pub mod market;

pub use config::*;
pub use logging::*;
pub use market::MarketSession;
