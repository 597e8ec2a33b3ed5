//! Cache key derivation

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::agents::{AgentRequest, AgentType, Payload};

/// Deterministic fingerprint of a request's output-affecting fields
///
/// Rendered as `<agent_type>:<sha256 hex>`. Object keys are sorted at every
/// depth before hashing, and an absent context hashes like an empty one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a request (priority, timeout, retries and metadata excluded)
    #[must_use]
    pub fn for_request(request: &AgentRequest) -> Self {
        Self::derive(request.agent_type, &request.input_data, request.context.as_ref())
    }

    /// Key for an agent type, input and optional context
    #[must_use]
    pub fn derive(agent_type: AgentType, input: &Payload, context: Option<&Payload>) -> Self {
        // `serde_json::Map` keeps keys sorted, so the compact form is canonical
        let canonical = Value::Array(vec![
            Value::Object(input.clone()),
            Value::Object(context.cloned().unwrap_or_default()),
        ]);

        let mut hasher = Sha256::new();
        hasher.update(agent_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.to_string().as_bytes());

        Self(format!("{}:{}", agent_type, hex::encode(hasher.finalize())))
    }

    /// The rendered key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_ignores_scheduling_fields() {
        let a = AgentRequest::new(AgentType::ContentCreator, payload(json!({"brief": "X"})));
        let b = a
            .clone()
            .with_priority(9)
            .with_timeout(Duration::from_secs(2))
            .with_max_retries(4)
            .with_metadata("trace", "abc");

        assert_eq!(CacheKey::for_request(&a), CacheKey::for_request(&b));
    }

    #[test]
    fn test_key_is_order_independent_at_depth() {
        let first = payload(json!({"brief": "X", "options": {"a": 1, "b": [1, {"y": 2, "x": 1}]}}));
        let second = payload(json!({"options": {"b": [1, {"x": 1, "y": 2}], "a": 1}, "brief": "X"}));

        assert_eq!(
            CacheKey::derive(AgentType::ContentCreator, &first, None),
            CacheKey::derive(AgentType::ContentCreator, &second, None)
        );
    }

    #[test]
    fn test_key_distinguishes_type_input_and_context() {
        let input = payload(json!({"content": "hello"}));
        let base = CacheKey::derive(AgentType::ContentModerator, &input, None);

        assert_ne!(base, CacheKey::derive(AgentType::ComplianceChecker, &input, None));
        assert_ne!(
            base,
            CacheKey::derive(AgentType::ContentModerator, &payload(json!({"content": "hello!"})), None)
        );
        assert_ne!(
            base,
            CacheKey::derive(
                AgentType::ContentModerator,
                &input,
                Some(&payload(json!({"campaign": "spring"})))
            )
        );
        // Array order is meaningful
        assert_ne!(
            CacheKey::derive(AgentType::ContentModerator, &payload(json!({"tags": [1, 2]})), None),
            CacheKey::derive(AgentType::ContentModerator, &payload(json!({"tags": [2, 1]})), None)
        );
    }

    #[test]
    fn test_key_hashes_sorted_compact_json() {
        let input = payload(json!({"b": 1, "a": {"d": 2, "c": 3}}));
        let key = CacheKey::derive(AgentType::ContentCreator, &input, None);

        let mut hasher = Sha256::new();
        hasher.update(b"content_creator");
        hasher.update([0u8]);
        hasher.update(br#"[{"a":{"c":3,"d":2},"b":1},{}]"#);
        assert_eq!(key.as_str(), format!("content_creator:{}", hex::encode(hasher.finalize())));
    }

    #[test]
    fn test_absent_context_equals_empty_context() {
        let input = payload(json!({"content": "hello"}));
        assert_eq!(
            CacheKey::derive(AgentType::ContentModerator, &input, None),
            CacheKey::derive(AgentType::ContentModerator, &input, Some(&Payload::new()))
        );
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::derive(AgentType::ContentCreator, &Payload::new(), None);
        let (prefix, digest) = key.as_str().split_once(':').unwrap();
        assert_eq!(prefix, "content_creator");
        assert_eq!(digest.len(), 64);
    }
}
