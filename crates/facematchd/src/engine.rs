use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use facematch_core::{FaceMatcher, Verification, VerifyError, VerifyRequest};
use image::RgbImage;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::decode::DecodedImage;
use crate::pipeline::{MatcherError, Verifier};
use crate::response::RawVerification;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("matcher panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Verify {
        img1: RgbImage,
        img2: RgbImage,
        request: VerifyRequest,
        reply: oneshot::Sender<Result<Verification, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Queue a verification and wait for the engine's answer.
    pub async fn submit(
        &self,
        img1: RgbImage,
        img2: RgbImage,
        request: VerifyRequest,
    ) -> Result<Verification, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                img1,
                img2,
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

#[async_trait]
impl Verifier for EngineHandle {
    async fn verify(
        &self,
        img1: DecodedImage,
        img2: DecodedImage,
        request: VerifyRequest,
    ) -> Result<RawVerification, MatcherError> {
        let verification = self
            .submit(img1.into_rgb(), img2.into_rgb(), request)
            .await
            .map_err(|e| MatcherError::new(e.to_string()))?;

        match serde_json::to_value(&verification) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(MatcherError::new(format!(
                "unexpected matcher result: {other}"
            ))),
            Err(e) => Err(MatcherError::new(e.to_string())),
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns `matcher` and serves requests one at a time until every
/// handle is dropped. A panic inside the matcher is reported to the caller
/// and the loop keeps serving.
pub fn spawn_engine<M>(mut matcher: M, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    M: FaceMatcher + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify {
                        img1,
                        img2,
                        request,
                        reply,
                    } => {
                        let result = run_verify(&mut matcher, &img1, &img2, &request);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_verify<M: FaceMatcher>(
    matcher: &mut M,
    img1: &RgbImage,
    img2: &RgbImage,
    request: &VerifyRequest,
) -> Result<Verification, EngineError> {
    tracing::debug!(
        model = %request.model_name,
        metric = %request.distance_metric,
        detector = %request.detector_backend,
        "engine: verify"
    );

    match panic::catch_unwind(AssertUnwindSafe(|| matcher.verify(img1, img2, request))) {
        Ok(result) => Ok(result?),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %message, "matcher panicked");
            Err(EngineError::Panicked(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::{FacialArea, FacialAreas};

    /// Reports the mean-intensity difference of the two images as the distance.
    struct MeanMatcher {
        calls: usize,
    }

    fn mean(img: &RgbImage) -> f64 {
        let raw = img.as_raw();
        raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len().max(1) as f64 / 255.0
    }

    impl FaceMatcher for MeanMatcher {
        fn verify(
            &mut self,
            img1: &RgbImage,
            img2: &RgbImage,
            request: &VerifyRequest,
        ) -> Result<Verification, VerifyError> {
            self.calls += 1;
            if request.model_name == "boom" {
                panic!("kaboom");
            }
            if request.model_name != "Facenet512" {
                return Err(VerifyError::UnknownModel(request.model_name.clone()));
            }
            let distance = (mean(img1) - mean(img2)).abs();
            Ok(Verification {
                verified: distance <= 0.3,
                distance,
                threshold: 0.3,
                model: request.model_name.clone(),
                detector_backend: request.detector_backend.clone(),
                similarity_metric: request.distance_metric.clone(),
                facial_areas: FacialAreas {
                    img1: FacialArea::full(img1.width(), img1.height()),
                    img2: FacialArea::full(img2.width(), img2.height()),
                },
                time: 0.0,
            })
        }
    }

    fn request(model: &str) -> VerifyRequest {
        VerifyRequest {
            model_name: model.into(),
            distance_metric: "cosine".into(),
            detector_backend: "skip".into(),
            enforce_detection: false,
        }
    }

    #[tokio::test]
    async fn test_submit_roundtrip() {
        let engine = spawn_engine(MeanMatcher { calls: 0 }, 2).unwrap();
        let img = RgbImage::from_pixel(4, 4, image::Rgb([128, 128, 128]));
        let result = engine.submit(img.clone(), img, request("Facenet512")).await.unwrap();
        assert!(result.verified);
        assert_eq!(result.distance, 0.0);
        assert_eq!(result.facial_areas.img1.w, 4);
    }

    #[tokio::test]
    async fn test_matcher_error_is_returned() {
        let engine = spawn_engine(MeanMatcher { calls: 0 }, 2).unwrap();
        let img = RgbImage::new(2, 2);
        let err = engine.submit(img.clone(), img, request("Nope")).await.unwrap_err();
        assert!(matches!(err, EngineError::Verify(VerifyError::UnknownModel(_))));
    }

    #[tokio::test]
    async fn test_engine_survives_panic() {
        let engine = spawn_engine(MeanMatcher { calls: 0 }, 2).unwrap();
        let img = RgbImage::new(2, 2);

        let err = engine.submit(img.clone(), img.clone(), request("boom")).await.unwrap_err();
        assert!(matches!(err, EngineError::Panicked(ref m) if m == "kaboom"));

        let ok = engine.submit(img.clone(), img, request("Facenet512")).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_verifier_returns_raw_map() {
        let engine = spawn_engine(MeanMatcher { calls: 0 }, 1).unwrap();
        let white = DecodedImage::from(RgbImage::from_pixel(2, 2, image::Rgb([255, 255, 255])));
        let black = DecodedImage::from(RgbImage::new(2, 2));
        let raw = Verifier::verify(&engine, white, black, request("Facenet512"))
            .await
            .unwrap();
        assert_eq!(raw["verified"], serde_json::json!(false));
        assert_eq!(raw["distance"], serde_json::json!(1.0));
        assert_eq!(raw["detector_backend"], serde_json::json!("skip"));
    }
}
