//! Image → face signature encoding.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{EncodedFace, FaceLocation, Signature};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Which face a registration photo contributes when it contains several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryFacePolicy {
    /// First face in detector output order.
    #[default]
    FirstDetected,
    /// Face with the largest bounding box.
    LargestBox,
    /// Face with the highest detector confidence.
    HighestConfidence,
}

impl FromStr for PrimaryFacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "first_detected" => Ok(Self::FirstDetected),
            "largest" | "largest_box" => Ok(Self::LargestBox),
            "confident" | "highest_confidence" => Ok(Self::HighestConfidence),
            other => Err(format!("unknown primary face policy: {other}")),
        }
    }
}

/// Pick the face a registration photo stands for.
///
/// `FirstDetected` trusts the detector's ordering and does not check that the
/// chosen face is the intended subject.
pub fn select_primary_face(policy: PrimaryFacePolicy, faces: Vec<EncodedFace>) -> Option<EncodedFace> {
    match policy {
        PrimaryFacePolicy::FirstDetected => faces.into_iter().next(),
        PrimaryFacePolicy::LargestBox => faces
            .into_iter()
            .max_by(|a, b| a.location.area().total_cmp(&b.location.area())),
        PrimaryFacePolicy::HighestConfidence => faces
            .into_iter()
            .max_by(|a, b| a.location.confidence.total_cmp(&b.location.confidence)),
    }
}

/// Converts photos into face signatures.
pub trait FaceEncoder {
    /// Every face in the photo, in detector output order. May be empty.
    fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError>;

    /// The single signature a registration photo contributes.
    fn encode_single(&mut self, image: &RgbImage, policy: PrimaryFacePolicy) -> Result<Signature, EncoderError> {
        let faces = self.encode_all(image)?;
        if faces.len() > 1 {
            tracing::warn!(faces = faces.len(), ?policy, "registration photo contains several faces");
        }
        select_primary_face(policy, faces)
            .map(|face| face.signature)
            .ok_or(EncoderError::NoFaceDetected)
    }
}

/// SCRFD detection followed by ResNet signature extraction.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models; fails fast when either file is missing.
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError> {
        let locations = self.detector.detect(image)?;
        let recognizer = &mut self.recognizer;
        encode_located(locations, |location| recognizer.extract(image, location))
    }
}

/// Attach a signature to each located face.
///
/// A face without landmarks cannot be aligned and is skipped with a warning;
/// any other recognizer failure aborts the photo.
fn encode_located<F>(locations: Vec<FaceLocation>, mut extract: F) -> Result<Vec<EncodedFace>, EncoderError>
where
    F: FnMut(&FaceLocation) -> Result<Signature, RecognizerError>,
{
    let mut faces = Vec::with_capacity(locations.len());
    for location in locations {
        let signature = match extract(&location) {
            Ok(signature) => signature,
            Err(RecognizerError::NoLandmarks) => {
                tracing::warn!(x = location.x, y = location.y, "face skipped: no landmarks");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(x = location.x, y = location.y, confidence = location.confidence, "face encoded");
        faces.push(EncodedFace { location, signature });
    }
    Ok(faces)
}
