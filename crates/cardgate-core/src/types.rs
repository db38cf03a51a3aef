use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest Euclidean distance at which two embeddings count as the same person.
pub const DEFAULT_MATCH_TOLERANCE: f32 = 0.6;

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

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("cannot compare an empty embedding")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseEmbeddingError {
    #[error("face encoding value #{index} is empty")]
    EmptyValue { index: usize },
    #[error("face encoding value #{index} is not a number: {token:?}")]
    InvalidValue { index: usize, token: String },
}

/// Face embedding vector (128-d for dlib-style encoders, 512-d for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean norm of the difference between two embeddings.
    ///
    /// Both sides must be non-empty and of equal length.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        if self.is_empty() || other.is_empty() {
            return Err(MatchError::Empty);
        }
        if self.len() != other.len() {
            return Err(MatchError::DimensionMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }

    /// Spreadsheet cell form: values joined by `,` with no padding.
    pub fn to_cell_text(&self) -> String {
        self.values
            .iter()
            .map(f32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the spreadsheet cell form. A blank cell is an empty embedding.
    pub fn parse_cell_text(text: &str) -> Result<Self, ParseEmbeddingError> {
        if text.trim().is_empty() {
            return Ok(Self::new(Vec::new()));
        }

        let values = text
            .split(',')
            .enumerate()
            .map(|(index, raw)| {
                let token = raw.trim();
                if token.is_empty() {
                    return Err(ParseEmbeddingError::EmptyValue { index });
                }
                token
                    .parse::<f32>()
                    .map_err(|_| ParseEmbeddingError::InvalidValue {
                        index,
                        token: token.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(values))
    }
}

/// Outcome of comparing a probe embedding against a registered one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance, absent when the embeddings were not comparable.
    pub distance: Option<f32>,
}

/// Strategy for deciding whether a probe embedding belongs to a registered face.
pub trait Matcher {
    fn compare(&self, registered: &Embedding, probe: &Embedding) -> MatchResult;
}

/// Fixed-threshold Euclidean matcher.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, registered: &Embedding, probe: &Embedding) -> MatchResult {
        match registered.euclidean_distance(probe) {
            Ok(distance) => {
                tracing::debug!(distance, tolerance = self.tolerance, "compared face embeddings");
                MatchResult {
                    matched: distance <= self.tolerance,
                    distance: Some(distance),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "embeddings not comparable, treating as mismatch");
                MatchResult {
                    matched: false,
                    distance: None,
                }
            }
        }
    }
}
