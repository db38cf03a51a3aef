//! cardgate-core — Face embeddings and the match predicate that gates card access.
//!
//! Embeddings come from an external model (SCRFD detection + ArcFace encoding
//! via ONNX Runtime); two embeddings belong to the same person when their
//! Euclidean distance is within a fixed tolerance.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use encoder::{EncodeError, FaceEncoder, OnnxFaceEncoder};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, Embedding, EuclideanMatcher, MatchError, MatchResult, Matcher,
    ParseEmbeddingError, DEFAULT_MATCH_TOLERANCE,
};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/cardgate/models`,
/// falling back to `~/.local/share/cardgate/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("cardgate")
        .join("models")
}
