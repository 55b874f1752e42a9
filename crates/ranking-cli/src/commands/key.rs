//! 캐시 키, 패턴, TTL 계산 명령.

use anyhow::{bail, Result};
use ranking_cache::{KeyParams, KeyPolicy};

/// 거래시간 판정 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOverride {
    /// 현재 시각으로 판정
    Live,
    Trading,
    Closed,
}

impl SessionOverride {
    pub fn from_flags(trading: bool, closed: bool) -> Self {
        match (trading, closed) {
            (true, _) => SessionOverride::Trading,
            (_, true) => SessionOverride::Closed,
            _ => SessionOverride::Live,
        }
    }

    fn as_option(self) -> Option<bool> {
        match self {
            SessionOverride::Live => None,
            SessionOverride::Trading => Some(true),
            SessionOverride::Closed => Some(false),
        }
    }
}

/// `name=value` 인자를 파라미터로 변환합니다.
///
/// `allow_bare`이면 값 없는 `name`을 미지정 파라미터로 받아들입니다.
pub fn parse_params(args: &[String], allow_bare: bool) -> Result<KeyParams> {
    let mut params = KeyParams::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, _)) if name.is_empty() => bail!("Missing parameter name in '{}'", arg),
            Some((name, value)) => params = params.with(name, value),
            None if allow_bare && !arg.is_empty() => params = params.with_opt(arg.as_str(), None::<&str>),
            None => bail!("Expected name=value, got '{}'", arg),
        }
    }
    Ok(params)
}

pub fn build_key(policy: &KeyPolicy, operation: &str, args: &[String]) -> Result<String> {
    let params = parse_params(args, false)?;
    let key = policy.build_key(operation, &params);
    if !KeyPolicy::validate_key(&key) {
        bail!("Generated key is not valid: '{}'", key);
    }
    Ok(key)
}

/// 파라미터와 일치하는 키 전체를 덮는 무효화 패턴들.
pub fn build_patterns(policy: &KeyPolicy, operation: &str, args: &[String]) -> Result<Vec<String>> {
    let params = parse_params(args, true)?;
    Ok(policy.invalidation_patterns(operation, &params).to_vec())
}

pub fn compute_ttl(policy: &KeyPolicy, operation: &str, session: SessionOverride) -> u64 {
    policy.compute_ttl(operation, session.as_option())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_key_from_args() {
        let policy = KeyPolicy::default();
        let key = build_key(&policy, "volume_ranking", &args(&["market=KOSPI", "count=20"])).unwrap();
        assert_eq!(key, "volume_ranking:count=20:market=KOSPI");
    }

    #[test]
    fn test_bare_names_only_in_patterns() {
        let policy = KeyPolicy::default();
        assert!(build_key(&policy, "volume_ranking", &args(&["market"])).is_err());

        let patterns = build_patterns(&policy, "volume_ranking", &args(&["market=KOSPI", "count"])).unwrap();
        assert_eq!(
            patterns,
            vec![
                "volume_ranking:count=*:market=KOSPI".to_string(),
                "volume_ranking:count=*:market=KOSPI:*".to_string(),
            ]
        );
    }

    #[test]
    fn test_patterns_for_unsupplied_last_parameter() {
        let policy = KeyPolicy::default();
        let patterns = build_patterns(&policy, "volume_ranking", &args(&["count=20", "market"])).unwrap();
        assert_eq!(patterns[0], "volume_ranking:count=20:market=*");
        assert!(patterns.iter().all(|p| !p.contains("**")));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let policy = KeyPolicy::default();
        let oversized = format!("market={}", "K".repeat(300));
        assert!(build_key(&policy, "volume_ranking", &args(&[oversized.as_str()])).is_err());
        assert!(parse_params(&args(&["=x"]), true).is_err());
    }

    #[test]
    fn test_ttl_overrides() {
        let policy = KeyPolicy::default();
        assert_eq!(compute_ttl(&policy, "volume_ranking", SessionOverride::Trading), 15);
        assert_eq!(compute_ttl(&policy, "volume_ranking", SessionOverride::Closed), 60);
        assert_eq!(SessionOverride::from_flags(false, false), SessionOverride::Live);
    }
}
