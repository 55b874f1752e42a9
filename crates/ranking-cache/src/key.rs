//! 캐시 키 생성과 TTL 정책.
//!
//! # 키 형식
//!
//! ```text
//! {operation}:{name}={value}:{name}={value}...
//! ```
//!
//! 파라미터는 이름 기준으로 정렬되므로 입력 순서와 관계없이 같은 키가 만들어집니다.
//! 값이 없는 파라미터는 키에서 빠지고, 패턴에서는 `name=*`로 표시됩니다.
//! 이름과 값은 퍼센트 인코딩되므로 `:`, `=`, 글롭 문자가 값에 들어 있어도 키가 겹치지
//! 않습니다.
//!
//! # TTL
//!
//! 도구별 기본 TTL을 거래시간에는 절반으로, 장 마감 후에는 두 배로 조정합니다.

use crate::error::{CacheError, Result};
use ranking_core::MarketSession;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 키 구성 요소 구분자.
pub const KEY_DELIMITER: char = ':';

/// 키 최대 길이 (바이트).
pub const MAX_KEY_LEN: usize = 250;

/// 표에 없는 작업의 기본 TTL (초).
pub const DEFAULT_BASE_TTL_SECS: u64 = 300;

/// 순위 조회 도구.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingTool {
    /// 거래량 순위
    VolumeRanking,
    /// 투자자별 매매 순위
    InvestorRanking,
    /// 거래량 변화율
    VolumeChange,
    /// 업종별 거래량
    SectorVolume,
    /// 시가총액 순위
    MarketCap,
    /// 이상 거래량
    UnusualVolume,
    /// 헬스체크
    HealthCheck,
}

impl RankingTool {
    pub const ALL: [RankingTool; 7] = [
        RankingTool::VolumeRanking,
        RankingTool::InvestorRanking,
        RankingTool::VolumeChange,
        RankingTool::SectorVolume,
        RankingTool::MarketCap,
        RankingTool::UnusualVolume,
        RankingTool::HealthCheck,
    ];

    /// 키에 쓰이는 작업 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingTool::VolumeRanking => "volume_ranking",
            RankingTool::InvestorRanking => "investor_ranking",
            RankingTool::VolumeChange => "volume_change",
            RankingTool::SectorVolume => "sector_volume",
            RankingTool::MarketCap => "market_cap",
            RankingTool::UnusualVolume => "unusual_volume",
            RankingTool::HealthCheck => "health_check",
        }
    }

    /// 거래시간 보정 전 기본 TTL (초).
    pub fn base_ttl_secs(&self) -> u64 {
        match self {
            RankingTool::VolumeRanking => 30,
            RankingTool::InvestorRanking => 60,
            RankingTool::VolumeChange => 120,
            RankingTool::SectorVolume => 300,
            RankingTool::MarketCap => 600,
            RankingTool::UnusualVolume => 60,
            RankingTool::HealthCheck => 10,
        }
    }

    /// 거래량 순위 파라미터.
    pub fn volume_ranking(market: &str, count: u32) -> KeyParams {
        KeyParams::new().with("market", market).with("count", count)
    }

    /// 투자자별 매매 순위 파라미터.
    pub fn investor_ranking(investor_type: &str, trade_type: &str, market: &str, count: u32) -> KeyParams {
        KeyParams::new()
            .with("investor_type", investor_type)
            .with("trade_type", trade_type)
            .with("market", market)
            .with("count", count)
    }

    /// 거래량 변화율 파라미터.
    pub fn volume_change(market: &str, period: &str, count: u32) -> KeyParams {
        KeyParams::new()
            .with("market", market)
            .with("period", period)
            .with("count", count)
    }

    /// 업종별 거래량 파라미터.
    pub fn sector_volume(market: &str, count: u32) -> KeyParams {
        KeyParams::new().with("market", market).with("count", count)
    }

    /// 시가총액 순위 파라미터. `filter_hash`는 [`hash_params`]로 만든 필터 지문입니다.
    pub fn market_cap(market: &str, count: u32, filter_hash: Option<&str>) -> KeyParams {
        KeyParams::new()
            .with("market", market)
            .with("count", count)
            .with_opt("filter", filter_hash)
    }

    /// 이상 거래량 파라미터.
    pub fn unusual_volume(market: &str, threshold: f64, count: u32, min_price: Option<u64>) -> KeyParams {
        KeyParams::new()
            .with("market", market)
            .with("threshold", threshold)
            .with("count", count)
            .with_opt("min_price", min_price)
    }
}

impl fmt::Display for RankingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RankingTool {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        RankingTool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| CacheError::KeyGeneration(format!("unknown ranking tool: {}", s)))
    }
}

/// 캐시 키 파라미터 집합.
///
/// 이름 순으로 정렬되어 저장됩니다. 같은 이름을 다시 넣으면 나중 값이 이깁니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams {
    params: BTreeMap<String, Option<String>>,
}

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(name.into(), Some(value.to_string()));
        self
    }

    /// 값이 없을 수 있는 파라미터. `None`은 키에서 생략되고 패턴에서는 와일드카드가 됩니다.
    pub fn with_opt<T: fmt::Display>(mut self, name: impl Into<String>, value: Option<T>) -> Self {
        self.params
            .insert(name.into(), value.map(|value| value.to_string()));
        self
    }

    /// 직렬화 가능한 값을 JSON 문자열로 렌더링해 추가합니다.
    pub fn with_json<T: Serialize + ?Sized>(self, name: impl Into<String>, value: &T) -> Result<Self> {
        let name = name.into();
        let rendered = serde_json::to_string(value).map_err(|e| {
            CacheError::KeyGeneration(format!("parameter '{}' is not serializable: {}", name, e))
        })?;
        Ok(self.with(name, rendered))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

impl<K, V> FromIterator<(K, V)> for KeyParams
where
    K: Into<String>,
    V: fmt::Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(KeyParams::new(), |params, (name, value)| params.with(name, value))
    }
}

/// 파싱된 캐시 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub operation: String,
    pub params: Vec<(String, String)>,
}

/// 캐시 키 생성과 TTL 계산 정책.
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    base_ttls: HashMap<String, u64>,
    default_base_ttl: u64,
    session: MarketSession,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self::new(MarketSession::default())
    }
}

impl KeyPolicy {
    /// 순위 도구 TTL 표로 정책을 생성합니다.
    pub fn new(session: MarketSession) -> Self {
        let base_ttls = RankingTool::ALL
            .iter()
            .map(|tool| (tool.as_str().to_string(), tool.base_ttl_secs()))
            .collect();

        Self {
            base_ttls,
            default_base_ttl: DEFAULT_BASE_TTL_SECS,
            session,
        }
    }

    /// 작업별 기본 TTL을 추가하거나 바꿉니다.
    pub fn with_base_ttl(mut self, operation: impl Into<String>, ttl_secs: u64) -> Self {
        self.base_ttls.insert(operation.into(), ttl_secs);
        self
    }

    pub fn session(&self) -> &MarketSession {
        &self.session
    }

    /// 정렬된 파라미터로 캐시 키를 만듭니다. 값이 없는 파라미터는 생략합니다.
    pub fn build_key(&self, operation: &str, params: &KeyParams) -> String {
        let mut key = operation.to_string();
        for (name, value) in params.iter() {
            if let Some(value) = value {
                push_segment(&mut key, name, &urlencoding::encode(value));
            }
        }
        key
    }

    /// 무효화용 패턴을 만듭니다.
    ///
    /// 값이 없는 파라미터는 `name=*`로 표시하고, 마지막에 `*` 세그먼트를 붙여 뒤에
    /// 파라미터가 더 있는 키를 일치시킵니다. 추가 파라미터가 없는 키까지 포함하려면
    /// [`invalidation_patterns`](Self::invalidation_patterns)를 사용합니다.
    pub fn build_pattern(&self, operation: &str, params: &KeyParams) -> String {
        let mut pattern = self.exact_pattern(operation, params);
        pattern.push(KEY_DELIMITER);
        pattern.push('*');
        pattern
    }

    /// 파라미터와 일치하는 모든 키를 덮는 패턴 쌍.
    ///
    /// 첫 번째는 추가 파라미터가 없는 키, 두 번째는 [`build_pattern`](Self::build_pattern)과
    /// 같습니다.
    pub fn invalidation_patterns(&self, operation: &str, params: &KeyParams) -> [String; 2] {
        [
            self.exact_pattern(operation, params),
            self.build_pattern(operation, params),
        ]
    }

    fn exact_pattern(&self, operation: &str, params: &KeyParams) -> String {
        let mut pattern = operation.to_string();
        for (name, value) in params.iter() {
            let value = value.map_or(Cow::Borrowed("*"), urlencoding::encode);
            push_segment(&mut pattern, name, &value);
        }
        pattern
    }

    /// 여러 파라미터 집합의 키를 한 번에 만듭니다.
    pub fn build_batch_keys(&self, operation: &str, param_sets: &[KeyParams]) -> Vec<String> {
        param_sets
            .iter()
            .map(|params| self.build_key(operation, params))
            .collect()
    }

    /// 작업의 기본 TTL (초).
    pub fn base_ttl(&self, operation: &str) -> u64 {
        self.base_ttls
            .get(operation)
            .copied()
            .unwrap_or(self.default_base_ttl)
    }

    /// 거래시간을 반영한 TTL (초).
    ///
    /// `is_trading_session`이 `None`이면 현재 시각으로 판정합니다.
    pub fn compute_ttl(&self, operation: &str, is_trading_session: Option<bool>) -> u64 {
        let base = self.base_ttl(operation);
        let trading = is_trading_session.unwrap_or_else(|| self.session.is_trading_session());

        if trading {
            base / 2
        } else {
            base.saturating_mul(2)
        }
    }

    /// 키 형식이 유효한지 확인합니다.
    pub fn validate_key(key: &str) -> bool {
        !key.is_empty()
            && key.len() <= MAX_KEY_LEN
            && !key.chars().any(|c| c.is_whitespace() || c.is_control())
    }

    /// [`build_key`](Self::build_key)로 만든 키를 분해합니다.
    pub fn parse_key(key: &str) -> Result<ParsedKey> {
        let mut segments = key.split(KEY_DELIMITER);
        let operation = segments
            .next()
            .filter(|op| !op.is_empty())
            .ok_or_else(|| CacheError::KeyGeneration(format!("empty operation in key '{}'", key)))?;

        let params = segments
            .map(|segment| {
                let (name, value) = segment.split_once('=').ok_or_else(|| {
                    CacheError::KeyGeneration(format!(
                        "malformed segment '{}' in key '{}'",
                        segment, key
                    ))
                })?;
                Ok((decode(name, key)?, decode(value, key)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ParsedKey {
            operation: operation.to_string(),
            params,
        })
    }
}

fn push_segment(buf: &mut String, name: &str, encoded_value: &str) {
    buf.push(KEY_DELIMITER);
    buf.push_str(&urlencoding::encode(name));
    buf.push('=');
    buf.push_str(encoded_value);
}

fn decode(part: &str, key: &str) -> Result<String> {
    urlencoding::decode(part)
        .map(Cow::into_owned)
        .map_err(|e| CacheError::KeyGeneration(format!("undecodable segment in key '{}': {}", key, e)))
}

/// 파라미터 집합의 16자리 SHA-256 지문.
///
/// 값이 없는 파라미터는 빈 문자열로 취급합니다.
pub fn hash_params(params: &KeyParams) -> String {
    let canonical = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value.unwrap_or("")))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_build_key_sorts_parameters() {
        let policy = KeyPolicy::default();
        let params = KeyParams::new().with("market", "KOSPI").with("count", 20);
        assert_eq!(
            policy.build_key("volume_ranking", &params),
            "volume_ranking:count=20:market=KOSPI"
        );
    }

    #[test]
    fn test_build_key_omits_absent_values() {
        let policy = KeyPolicy::default();
        let params = RankingTool::unusual_volume("KOSDAQ", 200.0, 10, None);
        assert_eq!(
            policy.build_key("unusual_volume", &params),
            "unusual_volume:count=10:market=KOSDAQ:threshold=200"
        );
        assert_eq!(policy.build_key("health_check", &KeyParams::new()), "health_check");
    }

    #[test]
    fn test_build_pattern() {
        let policy = KeyPolicy::default();
        let params = KeyParams::new()
            .with("market", "KOSPI")
            .with_opt("count", None::<u32>);
        assert_eq!(
            policy.build_pattern("volume_ranking", &params),
            "volume_ranking:count=*:market=KOSPI:*"
        );
        assert_eq!(
            policy.build_pattern("volume_ranking", &KeyParams::new()),
            "volume_ranking:*"
        );
    }

    #[test]
    fn test_unsupplied_last_parameter_never_doubles_wildcard() {
        let policy = KeyPolicy::default();
        let params = KeyParams::new()
            .with("count", 20)
            .with_opt("market", None::<&str>);

        for pattern in policy.invalidation_patterns("volume_ranking", &params) {
            assert!(!pattern.contains("**"), "{}", pattern);
            assert!(crate::pattern::KeyPattern::new(&pattern).is_ok());
        }
        let [exact, _] = policy.invalidation_patterns("volume_ranking", &params);
        let matcher = crate::pattern::KeyPattern::new(&exact).unwrap();
        let key = |count| policy.build_key("volume_ranking", &RankingTool::volume_ranking("KOSPI", count));
        assert!(matcher.matches(&key(20)));
        assert!(!matcher.matches(&key(50)));
    }

    #[test]
    fn test_invalidation_patterns_anchor_supplied_values() {
        let policy = KeyPolicy::default();
        let params = KeyParams::new().with("market", "KOSPI");
        let matchers: Vec<_> = policy
            .invalidation_patterns("volume_ranking", &params)
            .iter()
            .map(|p| crate::pattern::KeyPattern::new(p).unwrap())
            .collect();
        let matches = |key: &str| matchers.iter().any(|m| m.matches(key));

        assert!(matches("volume_ranking:market=KOSPI"));
        assert!(matches("volume_ranking:market=KOSPI:period=1d"));
        assert!(!matches("volume_ranking:market=KOSPI200"));
        assert!(!matches("volume_ranking:market=KOSPI200:period=1d"));
    }

    #[test]
    fn test_delimiters_in_values_do_not_collide() {
        let policy = KeyPolicy::default();
        let nested = KeyParams::new().with("market", "X:z=1");
        let split = KeyParams::new().with("market", "X").with("z", "1");

        let nested_key = policy.build_key("op", &nested);
        assert_ne!(nested_key, policy.build_key("op", &split));
        assert_eq!(nested_key, "op:market=X%3Az%3D1");

        let parsed = KeyPolicy::parse_key(&nested_key).unwrap();
        assert_eq!(parsed.params, vec![("market".to_string(), "X:z=1".to_string())]);
    }

    #[test]
    fn test_glob_characters_in_values_are_escaped() {
        let policy = KeyPolicy::default();
        let key = policy.build_key("op", &KeyParams::new().with("q", "a*b?[c]"));
        assert!(!key.contains(['*', '?', '[', ']']));
        assert!(KeyPolicy::validate_key(&key));
    }

    #[test]
    fn test_compute_ttl_session_sensitivity() {
        let policy = KeyPolicy::default();
        assert_eq!(policy.compute_ttl("volume_ranking", Some(true)), 15);
        assert_eq!(policy.compute_ttl("volume_ranking", Some(false)), 60);
        assert_eq!(policy.compute_ttl("market_cap", Some(true)), 300);
        assert_eq!(policy.compute_ttl("unknown_tool", Some(false)), 600);
    }

    #[test]
    fn test_custom_base_ttl() {
        let policy = KeyPolicy::default().with_base_ttl("quote", 4);
        assert_eq!(policy.compute_ttl("quote", Some(true)), 2);
        assert_eq!(policy.compute_ttl("quote", Some(false)), 8);
    }

    #[test]
    fn test_with_json_renders_serializable_values() {
        let params = KeyParams::new()
            .with_json("sectors", &["IT", "BIO"])
            .unwrap();
        assert_eq!(params.iter().next(), Some(("sectors", Some("[\"IT\",\"BIO\"]"))));
    }

    #[test]
    fn test_with_json_failure_is_key_generation_error() {
        // 문자열이 아닌 키를 가진 맵은 JSON으로 직렬화할 수 없음
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = KeyParams::new().with_json("bad", &bad).unwrap_err();
        assert!(matches!(err, CacheError::KeyGeneration(_)));
    }

    #[test]
    fn test_validate_key() {
        assert!(KeyPolicy::validate_key("volume_ranking:count=20:market=KOSPI"));
        assert!(KeyPolicy::validate_key("health_check"));
        assert!(!KeyPolicy::validate_key(""));
        assert!(!KeyPolicy::validate_key("volume ranking:count=20"));
        assert!(!KeyPolicy::validate_key("a:\n"));
        assert!(!KeyPolicy::validate_key(&"k".repeat(MAX_KEY_LEN + 1)));
    }

    #[test]
    fn test_parse_key_round_trip() {
        let policy = KeyPolicy::default();
        let key = policy.build_key(
            "investor_ranking",
            &RankingTool::investor_ranking("foreign", "buy", "KOSPI", 20),
        );
        let parsed = KeyPolicy::parse_key(&key).unwrap();
        assert_eq!(parsed.operation, "investor_ranking");
        assert_eq!(
            parsed.params,
            vec![
                ("count".to_string(), "20".to_string()),
                ("investor_type".to_string(), "foreign".to_string()),
                ("market".to_string(), "KOSPI".to_string()),
                ("trade_type".to_string(), "buy".to_string()),
            ]
        );
        assert!(KeyPolicy::parse_key(":count=1").is_err());
        assert!(KeyPolicy::parse_key("op:novalue").is_err());
    }

    #[test]
    fn test_hash_params_is_stable() {
        let a = KeyParams::new().with("min_cap", 1000).with("sector", "IT");
        let b = KeyParams::new().with("sector", "IT").with("min_cap", 1000);
        assert_eq!(hash_params(&a), hash_params(&b));
        assert_eq!(hash_params(&a).len(), 16);
        assert_ne!(hash_params(&a), hash_params(&KeyParams::new().with("sector", "BIO")));
    }

    #[test]
    fn test_batch_keys() {
        let policy = KeyPolicy::default();
        let keys = policy.build_batch_keys(
            "sector_volume",
            &[
                RankingTool::sector_volume("KOSPI", 10),
                RankingTool::sector_volume("KOSDAQ", 10),
            ],
        );
        assert_eq!(
            keys,
            vec![
                "sector_volume:count=10:market=KOSPI".to_string(),
                "sector_volume:count=10:market=KOSDAQ".to_string(),
            ]
        );
    }

    #[test]
    fn test_tool_from_str() {
        for tool in RankingTool::ALL {
            assert_eq!(tool.as_str().parse::<RankingTool>().unwrap(), tool);
        }
        assert!("price_ranking".parse::<RankingTool>().is_err());
    }

    proptest! {
        #[test]
        fn prop_key_is_independent_of_insertion_order(
            op in "[a-z_]{1,16}",
            pairs in prop::collection::btree_map("[a-z]{1,8}", "[A-Za-z0-9]{0,8}", 0..8),
            seed in any::<u64>(),
        ) {
            let policy = KeyPolicy::default();
            let forward: KeyParams = pairs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

            let mut shuffled: Vec<_> = pairs.iter().collect();
            let len = shuffled.len().max(1);
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
            let reordered: KeyParams = shuffled.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect();

            prop_assert_eq!(policy.build_key(&op, &forward), policy.build_key(&op, &reordered));
        }

        #[test]
        fn prop_parse_recovers_values_with_delimiters(
            pairs in prop::collection::btree_map("[a-z]{1,8}", "[A-Za-z0-9:=* ]{0,8}", 0..6),
        ) {
            let policy = KeyPolicy::default();
            let params: KeyParams = pairs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

            let parsed = KeyPolicy::parse_key(&policy.build_key("op", &params)).unwrap();
            let expected: Vec<_> = pairs.into_iter().collect();
            prop_assert_eq!(parsed.params, expected);
        }
    }
}
