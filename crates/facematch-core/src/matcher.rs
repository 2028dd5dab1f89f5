//! Two-image face verification on top of the detector and recognizers.

use crate::catalog::{self, DetectorSpec, ModelSpec};
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{
    BoundingBox, DistanceMetric, FaceMatcher, FacialArea, FacialAreas, Verification, VerifyRequest,
};
use image::RgbImage;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("unknown model name: {0}")]
    UnknownModel(String),
    #[error("unknown distance metric: {0} (expected cosine, euclidean or euclidean_l2)")]
    UnknownMetric(String),
    #[error("unknown detector backend: {0}")]
    UnknownDetector(String),
    #[error("model directory not found: {0}")]
    ModelDirMissing(String),
    #[error(
        "face could not be detected in {image}; \
         set enforce_detection to false to compare whole images"
    )]
    NoFaceDetected { image: &'static str },
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// ONNX-backed matcher with lazily loaded, cached sessions.
///
/// Each model and detector file is loaded on first use and kept for the
/// lifetime of the matcher.
pub struct OnnxMatcher {
    model_dir: PathBuf,
    intra_threads: usize,
    recognizers: HashMap<&'static str, FaceRecognizer>,
    detectors: HashMap<&'static str, FaceDetector>,
}

impl OnnxMatcher {
    /// Create a matcher reading model files from `model_dir`.
    ///
    /// Nothing is loaded here. A missing directory is only logged; each
    /// verification then fails until the models are installed.
    pub fn new(model_dir: impl Into<PathBuf>, intra_threads: usize) -> Self {
        let model_dir = model_dir.into();
        if !model_dir.is_dir() {
            tracing::warn!(
                path = %model_dir.display(),
                "model directory not found; verifications will fail until it exists"
            );
        }
        Self {
            model_dir,
            intra_threads: intra_threads.max(1),
            recognizers: HashMap::new(),
            detectors: HashMap::new(),
        }
    }

    fn recognizer(&mut self, spec: &'static ModelSpec) -> Result<&mut FaceRecognizer, VerifyError> {
        match self.recognizers.entry(spec.name) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let path = self.model_dir.join(spec.file);
                Ok(e.insert(FaceRecognizer::load(&path, spec, self.intra_threads)?))
            }
        }
    }

    /// Locate the most confident face, if the backend detects at all.
    fn locate(
        &mut self,
        backend: &'static DetectorSpec,
        image: &RgbImage,
        label: &'static str,
        enforce_detection: bool,
    ) -> Result<Option<BoundingBox>, VerifyError> {
        let Some(file) = backend.file else {
            return Ok(None);
        };

        let detector = match self.detectors.entry(file) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                e.insert(FaceDetector::load(&self.model_dir.join(file), self.intra_threads)?)
            }
        };

        let face = detector.detect(image)?.into_iter().next();
        match face {
            Some(face) => {
                tracing::debug!(image = label, confidence = face.confidence, "face located");
                Ok(Some(face))
            }
            None if enforce_detection => Err(VerifyError::NoFaceDetected { image: label }),
            None => {
                tracing::warn!(
                    image = label,
                    detector = backend.name,
                    "no face detected; comparing whole image"
                );
                Ok(None)
            }
        }
    }
}

impl FaceMatcher for OnnxMatcher {
    fn verify(
        &mut self,
        img1: &RgbImage,
        img2: &RgbImage,
        request: &VerifyRequest,
    ) -> Result<Verification, VerifyError> {
        let started = Instant::now();

        let (spec, metric, backend) = resolve(request)?;
        if !self.model_dir.is_dir() {
            return Err(VerifyError::ModelDirMissing(self.model_dir.display().to_string()));
        }

        let face1 = self.locate(backend, img1, "img1", request.enforce_detection)?;
        let face2 = self.locate(backend, img2, "img2", request.enforce_detection)?;

        let recognizer = self.recognizer(spec)?;
        let emb1 = recognizer.extract(img1, face1.as_ref())?;
        let emb2 = recognizer.extract(img2, face2.as_ref())?;

        let distance = emb1.distance(&emb2, metric) as f64;
        let threshold = spec.threshold(metric) as f64;

        let area = |face: &Option<BoundingBox>, img: &RgbImage| match face {
            Some(f) => FacialArea::from_bbox(f, img.width(), img.height()),
            None => FacialArea::full(img.width(), img.height()),
        };

        Ok(Verification {
            verified: distance <= threshold,
            distance,
            threshold,
            model: spec.name.to_string(),
            detector_backend: backend.name.to_string(),
            similarity_metric: metric.as_str().to_string(),
            facial_areas: FacialAreas {
                img1: area(&face1, img1),
                img2: area(&face2, img2),
            },
            time: started.elapsed().as_secs_f64(),
        })
    }
}

/// Resolve request names against the catalog before any model is touched.
fn resolve(
    request: &VerifyRequest,
) -> Result<(&'static ModelSpec, DistanceMetric, &'static DetectorSpec), VerifyError> {
    let spec = catalog::lookup_model(&request.model_name)
        .ok_or_else(|| VerifyError::UnknownModel(request.model_name.clone()))?;
    let metric: DistanceMetric = request.distance_metric.parse()?;
    let backend = catalog::lookup_detector(&request.detector_backend)
        .ok_or_else(|| VerifyError::UnknownDetector(request.detector_backend.clone()))?;
    Ok((spec, metric, backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str, metric: &str, detector: &str) -> VerifyRequest {
        VerifyRequest {
            model_name: model.into(),
            distance_metric: metric.into(),
            detector_backend: detector.into(),
            enforce_detection: false,
        }
    }

    fn temp_model_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("facematch-core-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_defaults() {
        let (spec, metric, backend) = resolve(&request("Facenet512", "cosine", "opencv")).unwrap();
        assert_eq!(spec.name, "Facenet512");
        assert_eq!(metric, DistanceMetric::Cosine);
        assert_eq!(backend.name, "opencv");
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = resolve(&request("NotAModel", "cosine", "opencv")).unwrap_err();
        assert_eq!(err.to_string(), "unknown model name: NotAModel");
    }

    #[test]
    fn test_resolve_unknown_metric() {
        let err = resolve(&request("ArcFace", "hamming", "opencv")).unwrap_err();
        assert!(matches!(err, VerifyError::UnknownMetric(_)));
    }

    #[test]
    fn test_resolve_unknown_detector() {
        let err = resolve(&request("ArcFace", "cosine", "mtcnn")).unwrap_err();
        assert!(matches!(err, VerifyError::UnknownDetector(ref d) if d == "mtcnn"));
    }

    #[test]
    fn test_missing_model_dir_fails_per_request() {
        let mut matcher = OnnxMatcher::new("/nonexistent/facematch-models", 2);
        let img = RgbImage::new(8, 8);

        let err = matcher
            .verify(&img, &img, &request("Facenet512", "cosine", "opencv"))
            .unwrap_err();
        assert!(
            matches!(err, VerifyError::ModelDirMissing(ref p) if p.contains("facematch-models"))
        );

        // Name errors still take precedence over the missing directory.
        let err = matcher
            .verify(&img, &img, &request("Nope", "cosine", "opencv"))
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnknownModel(_)));
    }

    #[test]
    fn test_verify_unknown_model_fails_before_loading() {
        let dir = temp_model_dir("unknown");
        let mut matcher = OnnxMatcher::new(&dir, 1);
        let img = RgbImage::new(8, 8);
        let err = matcher.verify(&img, &img, &request("Nope", "cosine", "skip")).unwrap_err();
        assert!(matches!(err, VerifyError::UnknownModel(_)));
        assert!(matcher.recognizers.is_empty());
    }

    #[test]
    fn test_verify_missing_model_file() {
        let dir = temp_model_dir("missing");
        let mut matcher = OnnxMatcher::new(&dir, 1);
        let img = RgbImage::new(8, 8);
        let err = matcher.verify(&img, &img, &request("Dlib", "cosine", "skip")).unwrap_err();
        assert!(matches!(err, VerifyError::Recognizer(RecognizerError::ModelNotFound(_))));
        assert!(err.to_string().contains("dlib.onnx"));
    }

    #[test]
    fn test_verify_missing_detector_file() {
        let dir = temp_model_dir("nodet");
        let mut matcher = OnnxMatcher::new(&dir, 1);
        let img = RgbImage::new(8, 8);
        let err = matcher.verify(&img, &img, &request("Dlib", "cosine", "opencv")).unwrap_err();
        assert!(matches!(err, VerifyError::Detector(DetectorError::ModelNotFound(_))));
    }
}
