//! Token usage tracking.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported for a model turn, or accumulated over a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: i64,
    /// Output tokens generated.
    pub output_tokens: i64,
    /// Tokens read from prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<i64>,
    /// Tokens written to prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<i64>,
}

impl TokenUsage {
    /// Read a `tokenUsage` object out of an event payload, if present.
    ///
    /// Missing numeric fields count as zero so partially-written usage still
    /// contributes what it has.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let usage = payload.get("tokenUsage")?.as_object()?;
        let field = |k: &str| usage.get(k).and_then(Value::as_i64);
        Some(Self {
            input_tokens: field("inputTokens").unwrap_or(0),
            output_tokens: field("outputTokens").unwrap_or(0),
            cache_read_tokens: field("cacheReadTokens"),
            cache_creation_tokens: field("cacheCreationTokens"),
        })
    }

    /// Whether every counter is zero or absent.
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_read_tokens.unwrap_or(0) == 0
            && self.cache_creation_tokens.unwrap_or(0) == 0
    }
}

impl AddAssign<&TokenUsage> for TokenUsage {
    fn add_assign(&mut self, rhs: &TokenUsage) {
        fn add_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            }
        }
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_read_tokens = add_opt(self.cache_read_tokens, rhs.cache_read_tokens);
        self.cache_creation_tokens = add_opt(self.cache_creation_tokens, rhs.cache_creation_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_omitted() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            ..Default::default()
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json, json!({"inputTokens": 100, "outputTokens": 50}));
    }

    #[test]
    fn from_payload_reads_nested_usage() {
        let payload = json!({"tokenUsage": {"inputTokens": 7, "outputTokens": 3, "cacheReadTokens": 2}});
        let usage = TokenUsage::from_payload(&payload).unwrap();
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.cache_read_tokens, Some(2));
        assert_eq!(usage.cache_creation_tokens, None);
    }

    #[test]
    fn from_payload_without_usage_is_none() {
        assert!(TokenUsage::from_payload(&json!({"content": "hi"})).is_none());
    }

    #[test]
    fn add_assign_accumulates() {
        let mut total = TokenUsage::default();
        total += &TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_tokens: Some(1),
            cache_creation_tokens: None,
        };
        total += &TokenUsage {
            input_tokens: 2,
            output_tokens: 1,
            cache_read_tokens: None,
            cache_creation_tokens: Some(4),
        };
        assert_eq!(total.input_tokens, 12);
        assert_eq!(total.output_tokens, 6);
        assert_eq!(total.cache_read_tokens, Some(1));
        assert_eq!(total.cache_creation_tokens, Some(4));
        assert!(!total.is_empty());
    }
}
