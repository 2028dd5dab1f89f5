//! facematch-core: face verification engine.
//!
//! SCRFD detection, landmark alignment and catalog recognition models,
//! all running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod catalog;
pub mod detector;
pub mod matcher;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use catalog::{ModelInfo, ModelSpec};
pub use matcher::{OnnxMatcher, VerifyError};
pub use types::{
    BoundingBox, DistanceMetric, Embedding, FaceMatcher, FacialArea, FacialAreas, Verification,
    VerifyRequest,
};

/// Default location of model files: `$XDG_DATA_HOME/facematch/models`,
/// falling back to `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
