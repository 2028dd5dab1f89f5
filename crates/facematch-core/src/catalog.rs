//! Static catalog of recognition models and detector backends.
//!
//! Each recognition model is an ONNX export placed in the model directory
//! under its `file` name. Thresholds are per distance metric and follow the
//! published calibration for each network.

use crate::types::DistanceMetric;
use serde::Serialize;

/// Memory layout of the recognizer's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, H, W]` (PyTorch / insightface exports).
    Nchw,
    /// `[1, H, W, 3]` (Keras exports).
    Nhwc,
}

/// Pixel normalization applied before inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// `pixel / 255`.
    Unit,
    /// `(pixel - mean) / std`.
    MeanStd { mean: f32, std: f32 },
    /// Raw 0–255 values.
    Raw,
}

impl Normalization {
    pub fn apply(&self, pixel: u8) -> f32 {
        let p = pixel as f32;
        match *self {
            Normalization::Unit => p / 255.0,
            Normalization::MeanStd { mean, std } => (p - mean) / std,
            Normalization::Raw => p,
        }
    }
}

/// Decision thresholds for one model, one per metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cosine: f32,
    pub euclidean: f32,
    pub euclidean_l2: f32,
}

/// A recognition model known to the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub name: &'static str,
    /// Reported LFW accuracy, display only.
    pub accuracy: &'static str,
    pub embedding_dim: usize,
    pub recommended: bool,
    pub file: &'static str,
    /// Square input side in pixels.
    pub input_size: u32,
    pub layout: TensorLayout,
    pub normalization: Normalization,
    pub thresholds: Thresholds,
}

impl ModelSpec {
    pub fn threshold(&self, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => self.thresholds.cosine,
            DistanceMetric::Euclidean => self.thresholds.euclidean,
            DistanceMetric::EuclideanL2 => self.thresholds.euclidean_l2,
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name,
            accuracy: self.accuracy,
            embedding_dim: self.embedding_dim,
            recommended: self.recommended.then_some(true),
        }
    }
}

/// Public, serializable view of a catalog entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: &'static str,
    pub accuracy: &'static str,
    pub embedding_dim: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<bool>,
}

pub const DEFAULT_MODEL: &str = "Facenet512";
pub const DEFAULT_DISTANCE_METRIC: &str = "cosine";
pub const DEFAULT_DETECTOR_BACKEND: &str = "opencv";
/// Detector name that bypasses face localization entirely.
pub const SKIP_DETECTOR: &str = "skip";

/// Ordered model catalog. The first entry is the default.
pub static MODELS: [ModelSpec; 8] = [
    ModelSpec {
        name: "Facenet512",
        accuracy: "99.65%",
        embedding_dim: 512,
        recommended: true,
        file: "facenet512.onnx",
        input_size: 160,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
        thresholds: Thresholds { cosine: 0.30, euclidean: 23.56, euclidean_l2: 1.04 },
    },
    ModelSpec {
        name: "Facenet",
        accuracy: "99.63%",
        embedding_dim: 128,
        recommended: false,
        file: "facenet.onnx",
        input_size: 160,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
        thresholds: Thresholds { cosine: 0.40, euclidean: 10.0, euclidean_l2: 0.80 },
    },
    ModelSpec {
        name: "ArcFace",
        accuracy: "99.53%",
        embedding_dim: 512,
        recommended: false,
        file: "w600k_r50.onnx",
        input_size: 112,
        layout: TensorLayout::Nchw,
        normalization: Normalization::MeanStd { mean: 127.5, std: 127.5 },
        thresholds: Thresholds { cosine: 0.68, euclidean: 4.15, euclidean_l2: 1.13 },
    },
    ModelSpec {
        name: "SFace",
        accuracy: "99.60%",
        embedding_dim: 128,
        recommended: false,
        file: "face_recognition_sface_2021dec.onnx",
        input_size: 112,
        layout: TensorLayout::Nchw,
        normalization: Normalization::Raw,
        thresholds: Thresholds { cosine: 0.593, euclidean: 10.734, euclidean_l2: 1.055 },
    },
    ModelSpec {
        name: "VGG-Face",
        accuracy: "98.78%",
        embedding_dim: 4096,
        recommended: false,
        file: "vgg_face.onnx",
        input_size: 224,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
        thresholds: Thresholds { cosine: 0.68, euclidean: 1.17, euclidean_l2: 1.17 },
    },
    ModelSpec {
        name: "OpenFace",
        accuracy: "93.80%",
        embedding_dim: 128,
        recommended: false,
        file: "openface.onnx",
        input_size: 96,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
        thresholds: Thresholds { cosine: 0.10, euclidean: 0.55, euclidean_l2: 0.55 },
    },
    ModelSpec {
        name: "DeepFace",
        accuracy: "97.35%",
        embedding_dim: 4096,
        recommended: false,
        file: "deepface.onnx",
        input_size: 152,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Unit,
        thresholds: Thresholds { cosine: 0.23, euclidean: 64.0, euclidean_l2: 0.64 },
    },
    ModelSpec {
        name: "Dlib",
        accuracy: "99.38%",
        embedding_dim: 128,
        recommended: false,
        file: "dlib.onnx",
        input_size: 150,
        layout: TensorLayout::Nhwc,
        normalization: Normalization::Raw,
        thresholds: Thresholds { cosine: 0.07, euclidean: 0.6, euclidean_l2: 0.4 },
    },
];

/// A face detector backend name and the SCRFD export that serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSpec {
    pub name: &'static str,
    /// `None` means detection is skipped and the whole image is the face.
    pub file: Option<&'static str>,
}

/// Accepted detector backend names. `opencv` is served by the lightweight
/// SCRFD-500M export, the accuracy-oriented names by SCRFD-10G.
pub static DETECTORS: [DetectorSpec; 4] = [
    DetectorSpec { name: "opencv", file: Some("det_500m.onnx") },
    DetectorSpec { name: "retinaface", file: Some("det_10g.onnx") },
    DetectorSpec { name: "scrfd", file: Some("det_10g.onnx") },
    DetectorSpec { name: SKIP_DETECTOR, file: None },
];

/// Exact, case-sensitive model lookup.
pub fn lookup_model(name: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.name == name)
}

pub fn lookup_detector(name: &str) -> Option<&'static DetectorSpec> {
    DETECTORS.iter().find(|d| d.name == name)
}

/// Catalog entries in display order.
pub fn list_models() -> Vec<ModelInfo> {
    MODELS.iter().map(ModelSpec::info).collect()
}
