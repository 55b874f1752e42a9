//! 거래시간(세션) 판별.
//!
//! 설정된 거래소 시간대 기준으로 평일 정규장 시간 안에 있는지 확인합니다.
//! 휴장일 캘린더는 고려하지 않습니다.

use crate::config::{ConfigError, MarketConfig};
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

const KRX_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 0, 0) {
    Some(t) => t,
    None => panic!("invalid KRX open time"),
};
const KRX_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(15, 30, 0) {
    Some(t) => t,
    None => panic!("invalid KRX close time"),
};

/// 거래소 정규장 세션.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSession {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for MarketSession {
    /// KRX 정규장: 09:00-15:30 KST.
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Seoul,
            open: KRX_OPEN,
            close: KRX_CLOSE,
        }
    }
}

impl MarketSession {
    /// 시간대와 개장/폐장 시각으로 세션을 생성합니다.
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Result<Self, ConfigError> {
        if open >= close {
            return Err(ConfigError::Invalid(format!(
                "market open ({}) must be before close ({})",
                open, close
            )));
        }
        Ok(Self { tz, open, close })
    }

    /// 설정에서 세션을 생성합니다.
    pub fn from_config(config: &MarketConfig) -> Result<Self, ConfigError> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone: {}", config.timezone)))?;
        let open = parse_hhmm(&config.open)?;
        let close = parse_hhmm(&config.close)?;
        Self::new(tz, open, close)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// 주어진 시각이 거래시간인지 확인합니다.
    ///
    /// 평일이고 현지 시각이 `open <= t <= close`이면 거래시간입니다.
    pub fn is_trading_session_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let current = local.time();
        current >= self.open && current <= self.close
    }

    /// 현재 시각이 거래시간인지 확인합니다.
    pub fn is_trading_session(&self) -> bool {
        self.is_trading_session_at(Utc::now())
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| ConfigError::Invalid(format!("invalid time '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Seoul
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_weekday_session_window() {
        let session = MarketSession::default();
        // 2024-03-04 월요일
        assert!(!session.is_trading_session_at(kst(2024, 3, 4, 8, 59)));
        assert!(session.is_trading_session_at(kst(2024, 3, 4, 9, 0)));
        assert!(session.is_trading_session_at(kst(2024, 3, 4, 12, 0)));
        assert!(session.is_trading_session_at(kst(2024, 3, 4, 15, 30)));
        assert!(!session.is_trading_session_at(kst(2024, 3, 4, 15, 31)));
    }

    #[test]
    fn test_weekend_is_closed() {
        let session = MarketSession::default();
        // 2024-03-02 토요일, 2024-03-03 일요일
        assert!(!session.is_trading_session_at(kst(2024, 3, 2, 10, 0)));
        assert!(!session.is_trading_session_at(kst(2024, 3, 3, 10, 0)));
    }

    #[test]
    fn test_timezone_is_applied() {
        let session = MarketSession::default();
        // 01:00 UTC 월요일 = 10:00 KST
        let utc = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        assert!(session.is_trading_session_at(utc));
        // 10:00 UTC 월요일 = 19:00 KST
        let utc = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        assert!(!session.is_trading_session_at(utc));
    }

    #[test]
    fn test_from_config() {
        let config = MarketConfig {
            timezone: "America/New_York".to_string(),
            open: "09:30".to_string(),
            close: "16:00".to_string(),
        };
        let session = MarketSession::from_config(&config).unwrap();
        assert_eq!(session.timezone(), chrono_tz::America::New_York);

        let bad = MarketConfig {
            open: "9h".to_string(),
            ..MarketConfig::default()
        };
        assert!(MarketSession::from_config(&bad).is_err());
    }
}
