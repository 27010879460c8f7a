//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB photo into the 640×640 model input, decodes the
//! three anchor-free stride heads and suppresses overlapping boxes.

use crate::types::FaceLocation;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUT_COUNT: usize = 9;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty image ({0}x{1})")]
    EmptyImage(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting the photo into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    /// Map a point in model-input space back to the source photo.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHeads {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw head outputs for one stride level.
struct StrideOutput<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [StrideHeads; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        if output_names.len() < SCRFD_OUTPUT_COUNT {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs {SCRFD_OUTPUT_COUNT} outputs (score/bbox/kps per stride), got {}",
                output_names.len()
            )));
        }

        let heads = map_stride_heads(&output_names);
        tracing::info!(path = model_path, outputs = ?output_names, ?heads, "loaded SCRFD model");

        Ok(Self { session, heads })
    }

    /// Detect faces in an RGB photo, strongest first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceLocation>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyImage(width, height));
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let heads = self.heads[level];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let output = StrideOutput {
                stride,
                scores: extract(heads.score, "scores")?,
                bboxes: extract(heads.bbox, "bboxes")?,
                kps: extract(heads.kps, "kps")?,
            };
            candidates.extend(decode_stride(&output, &letterbox, SCRFD_CONFIDENCE_THRESHOLD));
        }

        let faces = suppress_overlaps(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(width, height, faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Letterbox the photo into a normalized NCHW tensor.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);

    let new_w = ((width as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let new_h = ((height as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    // Padding stays 0.0, which is what SCRFD_MEAN normalizes to.
    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let x0 = letterbox.pad_x.floor() as usize;
    let y0 = letterbox.pad_y.floor() as usize;

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x0 + x as usize, y0 + y as usize);
        if tx >= size || ty >= size {
            continue;
        }
        for channel in 0..3 {
            tensor[[0, channel, ty, tx]] = (pixel[channel] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Locate each stride's score/bbox/kps tensors.
///
/// Exports either name them `score_8`, `bbox_16`, `kps_32`, ... or use opaque
/// numeric names in the standard order: scores 0-2, boxes 3-5, keypoints 6-8.
fn map_stride_heads(names: &[String]) -> [StrideHeads; 3] {
    let find = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<StrideHeads>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideHeads {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => std::array::from_fn(|level| StrideHeads {
            score: level,
            bbox: level + 3,
            kps: level + 6,
        }),
    }
}

/// Turn one stride level's raw outputs into face boxes in source coordinates.
fn decode_stride(output: &StrideOutput<'_>, letterbox: &Letterbox, threshold: f32) -> Vec<FaceLocation> {
    let stride = output.stride;
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    (0..grid_w * grid_h * SCRFD_ANCHORS_PER_CELL)
        .filter_map(|anchor| {
            let score = *output.scores.get(anchor)?;
            if score <= threshold {
                return None;
            }

            let cell = anchor / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * step;
            let cy = (cell / grid_w) as f32 * step;

            let offsets = output.bboxes.get(anchor * 4..anchor * 4 + 4)?;
            let (left, top) = letterbox.to_source(cx - offsets[0] * step, cy - offsets[1] * step);
            let (right, bottom) = letterbox.to_source(cx + offsets[2] * step, cy + offsets[3] * step);

            let landmarks = output.kps.get(anchor * 10..anchor * 10 + 10).map(|kps| {
                std::array::from_fn(|i| {
                    letterbox.to_source(cx + kps[i * 2] * step, cy + kps[i * 2 + 1] * step)
                })
            });

            Some(FaceLocation {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; the result is sorted by confidence, highest first.
fn suppress_overlaps(mut candidates: Vec<FaceLocation>, iou_threshold: f32) -> Vec<FaceLocation> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceLocation> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
