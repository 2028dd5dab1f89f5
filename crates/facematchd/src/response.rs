//! Response shaping: maps the matcher's untyped result onto the fixed
//! JSON contract returned to clients.

use serde::Serialize;
use serde_json::{Map, Value};

/// Raw matcher output. Any field may be missing or mistyped.
pub type RawVerification = Map<String, Value>;

const FALLBACK_DISTANCE: f64 = 1.0;
const FALLBACK_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResponse {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    pub time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

pub fn normalize(
    raw: &RawVerification,
    model: &str,
    detector: &str,
    elapsed_secs: f64,
) -> VerificationResponse {
    VerificationResponse {
        verified: raw.get("verified").map(coerce_bool).unwrap_or(false),
        distance: raw
            .get("distance")
            .and_then(coerce_f64)
            .unwrap_or(FALLBACK_DISTANCE),
        threshold: raw
            .get("threshold")
            .and_then(coerce_f64)
            .unwrap_or(FALLBACK_THRESHOLD),
        model: model.to_string(),
        detector: Some(detector.to_string()),
        time: round_secs(elapsed_secs),
    }
}

/// Round to millisecond precision.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawVerification {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_normalize_empty_uses_fallbacks() {
        let response = normalize(&RawVerification::new(), "Facenet512", "opencv", 0.0);
        assert!(!response.verified);
        assert_eq!(response.distance, 1.0);
        assert_eq!(response.threshold, 0.4);
        assert_eq!(response.model, "Facenet512");
        assert_eq!(response.detector.as_deref(), Some("opencv"));
        assert_eq!(response.time, 0.0);
    }

    #[test]
    fn test_normalize_typed_result() {
        let r = raw(json!({
            "verified": true,
            "distance": 0.21,
            "threshold": 0.3,
            "model": "ignored",
        }));
        let response = normalize(&r, "ArcFace", "skip", 1.23456);
        assert!(response.verified);
        assert_eq!(response.distance, 0.21);
        assert_eq!(response.threshold, 0.3);
        assert_eq!(response.model, "ArcFace");
        assert_eq!(response.time, 1.235);
    }

    #[test]
    fn test_normalize_mistyped_fields() {
        let r = raw(json!({"verified": "TRUE", "distance": "0.5", "threshold": [1]}));
        let response = normalize(&r, "m", "d", 0.0);
        assert!(response.verified);
        assert_eq!(response.distance, 0.5);
        assert_eq!(response.threshold, 0.4);

        let r = raw(json!({"verified": 0, "distance": true, "threshold": null}));
        let response = normalize(&r, "m", "d", 0.0);
        assert!(!response.verified);
        assert_eq!(response.distance, 1.0);
        assert_eq!(response.threshold, 0.4);
    }

    #[test]
    fn test_coerce_bool() {
        assert!(coerce_bool(&json!(1)));
        assert!(coerce_bool(&json!(0.5)));
        assert!(coerce_bool(&json!("1")));
        assert!(!coerce_bool(&json!("False")));
        assert!(!coerce_bool(&json!("yes")));
        assert!(!coerce_bool(&json!({})));
    }

    #[test]
    fn test_coerce_f64_rejects_non_finite() {
        assert_eq!(coerce_f64(&json!("nan")), None);
        assert_eq!(coerce_f64(&json!("inf")), None);
        assert_eq!(coerce_f64(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(coerce_f64(&json!(false)), Some(0.0));
    }

    #[test]
    fn test_detector_omitted_when_none() {
        let mut response = normalize(&RawVerification::new(), "m", "d", 0.0);
        response.detector = None;
        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("detector").is_none());
        assert_eq!(body["distance"], json!(1.0));
    }
}
