use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::matcher::VerifyError;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer face region reported back to callers, clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacialArea {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FacialArea {
    /// The whole image, used when detection was skipped or found nothing.
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, w: width, h: height }
    }

    pub fn from_bbox(face: &BoundingBox, width: u32, height: u32) -> Self {
        let x0 = face.x.max(0.0).min(width as f32);
        let y0 = face.y.max(0.0).min(height as f32);
        let x1 = (face.x + face.width).max(0.0).min(width as f32);
        let y1 = (face.y + face.height).max(0.0).min(height as f32);
        Self {
            x: x0 as u32,
            y: y0 as u32,
            w: (x1 - x0).max(0.0) as u32,
            h: (y1 - y0).max(0.0) as u32,
        }
    }
}

/// Face embedding vector (128 to 4096 dimensions depending on the model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Catalog name of the model that produced this embedding (e.g., "Facenet512").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Copy of this embedding scaled to unit L2 norm. Zero vectors are returned unchanged.
    pub fn l2_normalized(&self) -> Embedding {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|x| x / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }

    /// Dissimilarity under `metric`. Lower = more similar.
    pub fn distance(&self, other: &Embedding, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => 1.0 - self.similarity(other),
            DistanceMetric::Euclidean => self.euclidean_distance(other),
            DistanceMetric::EuclideanL2 => self
                .l2_normalized()
                .euclidean_distance(&other.l2_normalized()),
        }
    }
}

/// Distance function used to compare two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    EuclideanL2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(VerifyError::UnknownMetric(other.to_string())),
        }
    }
}

/// Parameters of one verification call, all as supplied by the caller.
///
/// Names are resolved against the catalog inside the matcher, so unknown
/// values surface as [`VerifyError`]s rather than being rejected up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub model_name: String,
    pub distance_metric: String,
    pub detector_backend: String,
    /// Fail with `NoFaceDetected` instead of falling back to the whole image.
    pub enforce_detection: bool,
}

/// Face regions used for each input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacialAreas {
    pub img1: FacialArea,
    pub img2: FacialArea,
}

/// Outcome of comparing two face images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub model: String,
    pub detector_backend: String,
    pub similarity_metric: String,
    pub facial_areas: FacialAreas,
    /// Matcher-side processing time in seconds.
    pub time: f64,
}

/// Strategy for deciding whether two images show the same identity.
pub trait FaceMatcher {
    fn verify(
        &mut self,
        img1: &RgbImage,
        img2: &RgbImage,
        request: &VerifyRequest,
    ) -> Result<Verification, VerifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_distance_identical_is_zero() {
        let a = emb(&[0.3, -1.2, 4.0]);
        assert!(a.distance(&a, DistanceMetric::Cosine).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite_is_two() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.distance(&b, DistanceMetric::Cosine) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.distance(&b, DistanceMetric::Euclidean) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_l2_ignores_magnitude() {
        let a = emb(&[1.0, 1.0]);
        let b = emb(&[10.0, 10.0]);
        assert!(a.distance(&b, DistanceMetric::EuclideanL2).abs() < 1e-6);
        assert!(a.distance(&b, DistanceMetric::Euclidean) > 10.0);
    }

    #[test]
    fn test_l2_normalized_zero_vector_unchanged() {
        let a = emb(&[0.0, 0.0, 0.0]);
        assert_eq!(a.l2_normalized().values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_metric_parse_roundtrip() {
        for name in ["cosine", "euclidean", "euclidean_l2"] {
            let metric: DistanceMetric = name.parse().unwrap();
            assert_eq!(metric.as_str(), name);
        }
    }

    #[test]
    fn test_metric_parse_unknown() {
        let err = "manhattan".parse::<DistanceMetric>().unwrap_err();
        assert!(matches!(err, VerifyError::UnknownMetric(ref m) if m == "manhattan"));
    }

    #[test]
    fn test_facial_area_clamped_to_image() {
        let face = BoundingBox {
            x: -10.0,
            y: 5.0,
            width: 50.0,
            height: 200.0,
            confidence: 0.9,
            landmarks: None,
        };
        let area = FacialArea::from_bbox(&face, 100, 100);
        assert_eq!(area, FacialArea { x: 0, y: 5, w: 40, h: 95 });
    }
}
