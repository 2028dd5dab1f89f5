//! The per-request verification pipeline:
//! decode both images, invoke the matcher, normalize its result.

use std::time::Instant;

use async_trait::async_trait;
use facematch_core::VerifyRequest;
use thiserror::Error;

use crate::decode::{self, DecodeError, DecodedImage, ImagePayload};
use crate::options::VerificationOptions;
use crate::response::{self, RawVerification, VerificationResponse};

/// Any failure reported by the matcher, reduced to its message.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct MatcherError {
    pub message: String,
}

impl MatcherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("image decoding task failed: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

/// Something that can compare two decoded images.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        img1: DecodedImage,
        img2: DecodedImage,
        request: VerifyRequest,
    ) -> Result<RawVerification, MatcherError>;
}

/// Call the matcher with detection enforcement off.
///
/// Returns the raw result and the seconds elapsed since `started`.
pub async fn invoke(
    verifier: &dyn Verifier,
    img1: DecodedImage,
    img2: DecodedImage,
    options: &VerificationOptions,
    started: Instant,
) -> Result<(RawVerification, f64), MatcherError> {
    let request = VerifyRequest {
        model_name: options.model_name.clone(),
        distance_metric: options.distance_metric.clone(),
        detector_backend: options.detector_backend.clone(),
        enforce_detection: false,
    };
    let raw = verifier.verify(img1, img2, request).await?;
    Ok((raw, started.elapsed().as_secs_f64()))
}

/// Run the whole pipeline for one request.
///
/// A decode failure returns before the matcher is called.
pub async fn run(
    verifier: &dyn Verifier,
    img1: ImagePayload,
    img2: ImagePayload,
    options: VerificationOptions,
    started: Instant,
) -> Result<VerificationResponse, PipelineError> {
    let (img1, img2) = tokio::task::spawn_blocking(move || {
        let a = decode::decode(&img1)?;
        let b = decode::decode(&img2)?;
        Ok::<_, DecodeError>((a, b))
    })
    .await??;

    tracing::info!(
        img1 = ?(img1.width(), img1.height()),
        img2 = ?(img2.width(), img2.height()),
        model = %options.model_name,
        metric = %options.distance_metric,
        detector = %options.detector_backend,
        "comparing faces"
    );

    let (raw, elapsed) = invoke(verifier, img1, img2, &options, started).await?;
    let response = response::normalize(
        &raw,
        &options.model_name,
        &options.detector_backend,
        elapsed,
    );

    let verdict = if response.verified { "MATCH" } else { "NO MATCH" };
    tracing::info!(
        verdict,
        distance = response.distance,
        threshold = response.threshold,
        time = response.time,
        "verification complete"
    );

    Ok(response)
}
