//! Glob-style key patterns (`*` matches any run, `?` matches one character).

use crate::error::{StoreError, StoreResult};
use regex_lite::Regex;

/// A compiled key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob pattern. Every character other than `*` and `?` is literal.
    pub fn new(pattern: &str) -> StoreResult<Self> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for ch in pattern.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex_lite::escape(other.encode_utf8(&mut buf))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    /// Returns true if `key` matches the whole pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
