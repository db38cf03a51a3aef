//! Frame-to-embedding step: find a face and encode it.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns a grayscale frame into a face embedding.
///
/// `Ok(None)` means the frame was processed but contained no face.
pub trait FaceEncoder {
    fn encode(&mut self, gray: &[u8], width: u32, height: u32)
        -> Result<Option<Embedding>, EncodeError>;
}

/// SCRFD + ArcFace encoder. Uses the most confident face in the frame.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Embedding>, EncodeError> {
        let faces = self.detector.detect(gray, width, height)?;
        let Some(face) = faces.first() else {
            tracing::info!("no face detected");
            return Ok(None);
        };

        tracing::debug!(
            confidence = face.confidence,
            candidates = faces.len(),
            "encoding best face"
        );
        let embedding = self.recognizer.extract(gray, width, height, face)?;
        Ok(Some(embedding))
    }
}
