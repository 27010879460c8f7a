use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of dimensions in a face signature produced by the ResNet recognizer.
pub const SIGNATURE_DIM: usize = 128;

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("expected {SIGNATURE_DIM}-dim signature, got {0} values")]
    WrongLength(usize),
    #[error("expected {expected} signature bytes, got {0}", expected = SIGNATURE_DIM * 4)]
    WrongByteLength(usize),
    #[error("signature contains a non-finite value")]
    NonFinite,
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceLocation {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box, 0.0 when disjoint or degenerate.
    pub fn iou(&self, other: &FaceLocation) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;

        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Fixed-length face signature.
///
/// Always exactly [`SIGNATURE_DIM`] finite values; construction validates this so the
/// matcher never compares vectors of different shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Signature {
    values: Vec<f32>,
}

impl Signature {
    pub fn new(values: Vec<f32>) -> Result<Self, SignatureError> {
        if values.len() != SIGNATURE_DIM {
            return Err(SignatureError::WrongLength(values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SignatureError::NonFinite);
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance between two signatures.
    pub fn distance(&self, other: &Signature) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Little-endian `f32` encoding used for BLOB storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_DIM * 4 {
            return Err(SignatureError::WrongByteLength(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }
}

impl TryFrom<Vec<f32>> for Signature {
    type Error = SignatureError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Signature> for Vec<f32> {
    fn from(signature: Signature) -> Self {
        signature.values
    }
}

/// A face found in an image together with its signature.
#[derive(Debug, Clone)]
pub struct EncodedFace {
    pub location: FaceLocation,
    pub signature: Signature,
}
