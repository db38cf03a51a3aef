//! SCRFD face detector via ONNX Runtime.
//!
//! The frame is letterboxed into a 640×640 square, run through the network,
//! and the three anchor-free stride heads (8, 16, 32) are decoded back into
//! frame coordinates before non-maximum suppression.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Placement of the resized frame inside the square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn for_frame(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let scaled_w = (width as f32 * scale).round();
        let scaled_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((INPUT_SIZE as f32 - scaled_w) / 2.0).floor(),
            pad_y: ((INPUT_SIZE as f32 - scaled_h) / 2.0).floor(),
        }
    }

    /// Network-input coordinates back to frame coordinates.
    fn unmap(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Positions of the (score, bbox, keypoint) outputs for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHeads {
    score: usize,
    bbox: usize,
    kps: usize,
}

pub struct FaceDetector {
    session: Session,
    heads: [StrideHeads; 3],
}

impl FaceDetector {
    /// Load the SCRFD model (e.g. `det_10g.onnx`).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "expected 9 SCRFD outputs, model has {}",
                names.len()
            )));
        }
        let heads = map_output_heads(&names);

        tracing::info!(path = %model_path.display(), outputs = ?names, "loaded face detector");

        Ok(Self { session, heads })
    }

    /// Detect faces in a grayscale frame, most confident first.
    pub fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = preprocess(gray, width, height)?;
        let heads = self.heads;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride, head) in STRIDES.into_iter().zip(heads) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} @ stride {stride}: {e}")))
            };
            let scores = extract(head.score, "scores")?;
            let boxes = extract(head.bbox, "boxes")?;
            let kps = extract(head.kps, "keypoints")?;

            candidates.extend(decode_stride(scores, boxes, kps, stride, &letterbox));
        }

        let faces = non_max_suppression(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = faces.len(), "detection complete");
        Ok(faces)
    }
}

/// Letterbox the frame and normalise it into a 1×3×640×640 tensor.
///
/// Grayscale is replicated across all three channels; padding uses the pixel
/// mean so it normalises to zero.
fn preprocess(gray: &[u8], width: u32, height: u32) -> Result<(Array4<f32>, Letterbox), DetectorError> {
    let frame = GrayImage::from_raw(width, height, gray.to_vec()).ok_or_else(|| {
        DetectorError::InvalidFrame(format!(
            "{} bytes for a {width}x{height} frame",
            gray.len()
        ))
    })?;

    let letterbox = Letterbox::for_frame(width, height);
    let scaled_w = ((width as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let scaled_h = ((height as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let resized = imageops::resize(&frame, scaled_w, scaled_h, FilterType::Triangle);

    let (pad_x, pad_y) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    let side = INPUT_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, 3, side, side), |(_, _, y, x)| {
        let (x, y) = (x as u32, y as u32);
        let pixel = if x >= pad_x && y >= pad_y && x - pad_x < scaled_w && y - pad_y < scaled_h {
            resized.get_pixel(x - pad_x, y - pad_y).0[0] as f32
        } else {
            PIXEL_MEAN
        };
        (pixel - PIXEL_MEAN) / PIXEL_STD
    });

    Ok((tensor, letterbox))
}

/// Work out which output tensor holds which head.
///
/// Exports that name their outputs `score_8`, `bbox_16`, `kps_32`... are mapped
/// by name; anything else gets the conventional positional layout
/// (scores 0–2, boxes 3–5, keypoints 6–8).
fn map_output_heads(names: &[String]) -> [StrideHeads; 3] {
    let position = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<StrideHeads>> = STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideHeads {
                score: position("score", stride)?,
                bbox: position("bbox", stride)?,
                kps: position("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(heads) => {
            tracing::debug!(?heads, "SCRFD outputs mapped by name");
            [heads[0], heads[1], heads[2]]
        }
        None => {
            tracing::debug!(?names, "SCRFD output names unrecognised, using positional layout");
            std::array::from_fn(|i| StrideHeads {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

/// Decode one stride head into frame-space candidate boxes.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid = INPUT_SIZE as usize / stride;
    let step = stride as f32;

    scores
        .iter()
        .take(grid * grid * ANCHORS_PER_CELL)
        .enumerate()
        .filter(|&(_, &score)| score > SCORE_THRESHOLD)
        .filter_map(|(anchor, &score)| {
            let cell = anchor / ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let d = boxes.get(anchor * 4..anchor * 4 + 4)?;
            let (x1, y1) = letterbox.unmap((cx - d[0] * step, cy - d[1] * step));
            let (x2, y2) = letterbox.unmap((cx + d[2] * step, cy + d[3] * step));

            let landmarks = kps.get(anchor * 10..anchor * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap((cx + k[i * 2] * step, cy + k[i * 2 + 1] * step)))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy NMS: keep the most confident box, drop anything overlapping it, repeat.
fn non_max_suppression(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
