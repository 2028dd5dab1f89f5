use facematch_core::catalog::{DEFAULT_DETECTOR_BACKEND, DEFAULT_DISTANCE_METRIC, DEFAULT_MODEL};
use serde::Deserialize;

/// Verification options as the client sent them.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub distance_metric: Option<String>,
    #[serde(default)]
    pub detector_backend: Option<String>,
}

/// Fully resolved options. Values are passed through to the matcher as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOptions {
    pub model_name: String,
    pub distance_metric: String,
    pub detector_backend: String,
}

/// Fill in defaults for anything the client left out.
pub fn resolve(raw: RawOptions) -> VerificationOptions {
    VerificationOptions {
        model_name: raw.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        distance_metric: raw
            .distance_metric
            .unwrap_or_else(|| DEFAULT_DISTANCE_METRIC.to_string()),
        detector_backend: raw
            .detector_backend
            .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
    }
}
