//! Confidence scoring helpers
//!
//! Handlers report a task-specific signal from their result payload; these
//! helpers read it and keep every score inside [0, 1].

use serde_json::Value;

use super::types::Payload;

/// Score used when a result carries no richer signal
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Score for degraded (unparseable) output
pub const DEGRADED_CONFIDENCE: f64 = 0.5;

/// Clamp into [0, 1]; NaN maps to 0
#[must_use]
pub fn clamp(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Read a numeric field as a confidence signal
#[must_use]
pub fn from_field(payload: &Payload, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64).map(clamp)
}

/// Mean of `key` across the objects of an array field
///
/// Entries without a numeric `key` are skipped; `None` when nothing is left.
#[must_use]
pub fn mean_of(payload: &Payload, array_key: &str, key: &str) -> Option<f64> {
    let scores: Vec<f64> = payload
        .get(array_key)?
        .as_array()?
        .iter()
        .filter_map(|item| item.get(key).and_then(Value::as_f64))
        .map(clamp)
        .collect();

    if scores.is_empty() {
        return None;
    }
    Some(clamp(scores.iter().sum::<f64>() / scores.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp(-0.3), 0.0);
        assert_eq!(clamp(0.42), 0.42);
        assert_eq!(clamp(3.0), 1.0);
        assert_eq!(clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_from_field() {
        let p = payload(json!({"compliance_score": 0.7, "label": "x"}));
        assert_eq!(from_field(&p, "compliance_score"), Some(0.7));
        assert_eq!(from_field(&p, "label"), None);
        assert_eq!(from_field(&p, "missing"), None);
    }

    #[test]
    fn test_mean_of_claims() {
        let p = payload(json!({
            "claims_validation": [
                {"claim": "a", "confidence": 0.9},
                {"claim": "b", "confidence": 0.5},
                {"claim": "c"}
            ]
        }));
        let mean = mean_of(&p, "claims_validation", "confidence").unwrap();
        assert!((mean - 0.7).abs() < 1e-9);

        let empty = payload(json!({"claims_validation": []}));
        assert_eq!(mean_of(&empty, "claims_validation", "confidence"), None);
    }
}
