//! 글롭 패턴 키 매칭.
//!
//! Redis `KEYS`와 같은 규칙(`*`, `?`, `[...]`)으로 프로세스 내부 계층의 키를 고릅니다.

use crate::error::{CacheError, Result};
use glob::Pattern;

/// 컴파일된 키 패턴.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    compiled: Pattern,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        // Redis는 `**`를 `*`와 같게 취급하지만 glob은 경로 구성 요소가 아니면 거부한다.
        let compiled = Pattern::new(&collapse_wildcards(pattern)).map_err(|e| {
            CacheError::KeyGeneration(format!("invalid key pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, key: &str) -> bool {
        self.compiled.matches(key)
    }
}

fn collapse_wildcards(pattern: &str) -> String {
    let mut collapsed = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}
