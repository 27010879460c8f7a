//! ResNet face recognizer via ONNX Runtime.
//!
//! Produces 128-dimensional signatures from aligned 150×150 RGB chips using
//! an ONNX export of the dlib metric-learning ResNet. Signatures are left
//! unnormalized: the 0.6 Euclidean threshold is calibrated on raw outputs.

use crate::alignment::{self, CHIP_SIZE};
use crate::types::{FaceLocation, Signature, SIGNATURE_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Per-channel training means (R, G, B).
const RESNET_MEAN: [f32; 3] = [122.782, 117.001, 104.298];
const RESNET_SCALE: f32 = 256.0;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; alignment needs the detector's 5 points")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 128-d ResNet face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the recognizer ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ResNet recognizer"
        );

        Ok(Self { session })
    }

    /// Compute the signature of one detected face.
    pub fn extract(&mut self, image: &RgbImage, face: &FaceLocation) -> Result<Signature, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let chip = alignment::align_face(image, landmarks);
        let input = preprocess(&chip);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("signature extraction: {e}")))?;

        if raw.len() != SIGNATURE_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {SIGNATURE_DIM}-dim signature, got {}",
                raw.len()
            )));
        }

        Signature::new(raw.to_vec()).map_err(|e| RecognizerError::InferenceFailed(e.to_string()))
    }
}

/// Mean-subtract and scale an aligned chip into a NCHW float tensor.
fn preprocess(chip: &RgbImage) -> Array4<f32> {
    let size = CHIP_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in chip.enumerate_pixels() {
        if x as usize >= size || y as usize >= size {
            continue;
        }
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                (pixel[channel] as f32 - RESNET_MEAN[channel]) / RESNET_SCALE;
        }
    }

    tensor
}
