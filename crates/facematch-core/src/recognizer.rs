//! Face embedding extraction via ONNX Runtime.
//!
//! One recognizer per catalog model. Input geometry, tensor layout and
//! pixel normalization come from the model's [`ModelSpec`].

use crate::alignment;
use crate::catalog::{ModelSpec, TensorLayout};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
    spec: &'static ModelSpec,
}

impl FaceRecognizer {
    /// Load the ONNX export for `spec` from `model_path`.
    pub fn load(
        model_path: &Path,
        spec: &'static ModelSpec,
        intra_threads: usize,
    ) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            model = spec.name,
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded recognition model"
        );

        Ok(Self { session, spec })
    }

    /// Extract the embedding of `face`, or of the whole image when `face` is `None`.
    ///
    /// Faces with landmarks are aligned; faces without are cropped from their box.
    /// The raw (unnormalized) network output is returned.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: Option<&BoundingBox>,
    ) -> Result<Embedding, RecognizerError> {
        let chip = alignment::face_chip(image, face, self.spec.input_size);
        let input = preprocess(&chip, self.spec);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != self.spec.embedding_dim {
            return Err(RecognizerError::InferenceFailed(format!(
                "{}: expected {}-dim embedding, got {}",
                self.spec.name,
                self.spec.embedding_dim,
                raw.len()
            )));
        }

        Ok(Embedding {
            values: raw.to_vec(),
            model_version: Some(self.spec.name.to_string()),
        })
    }
}

/// Convert an RGB face chip into the model's input tensor.
fn preprocess(chip: &RgbImage, spec: &ModelSpec) -> Array4<f32> {
    let size = spec.input_size as usize;
    let mut tensor = match spec.layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
    };

    for (x, y, px) in chip.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= size || y >= size {
            continue;
        }
        for c in 0..3 {
            let v = spec.normalization.apply(px[c]);
            match spec.layout {
                TensorLayout::Nchw => tensor[[0, c, y, x]] = v,
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = v,
            }
        }
    }

    tensor
}
