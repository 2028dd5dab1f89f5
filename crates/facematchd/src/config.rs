use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5005).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Pending verifications the engine channel holds before callers wait.
    pub queue_depth: usize,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Whether to load and exercise the default model before serving.
    pub warmup: bool,
    /// Whether to answer cross-origin requests.
    pub cors: bool,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEMATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facematch_core::default_model_dir());

        Self {
            bind_addr: std::env::var("FACEMATCH_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5005".to_string()),
            model_dir,
            intra_threads: env_usize("FACEMATCH_INTRA_THREADS", 2),
            queue_depth: env_usize("FACEMATCH_QUEUE_DEPTH", 16).max(1),
            max_body_bytes: env_usize("FACEMATCH_MAX_BODY_BYTES", 32 * 1024 * 1024),
            warmup: env_flag("FACEMATCH_WARMUP", true),
            cors: env_flag("FACEMATCH_CORS", true),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Any value other than "0" enables the flag.
fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
