use crate::codec::EncodedImage;
use serde::{Deserialize, Serialize};

/// A single locate request: one image, one object label, one credential.
pub struct DetectionRequest {
    pub image: EncodedImage,
    pub label: String,
    pub api_key: String,
}

/// Where (and whether) the model found the requested object.
///
/// `coords` are `[x1, y1, x2, y2]` as fractions of the image width and height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub found: bool,
    pub coords: [f32; 4],
    pub confidence: f32,
    pub description: String,
}

impl DetectionResult {
    /// Builds a result, clamping the confidence and coordinates into `[0, 1]`
    /// and ordering each axis so that `x1 <= x2` and `y1 <= y2`.
    pub fn new(found: bool, coords: [f32; 4], confidence: f32, description: String) -> Self {
        let [x1, y1, x2, y2] = coords.map(unit);
        Self {
            found,
            coords: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
            confidence: unit(confidence),
            description,
        }
    }

    /// The result used whenever a call fails or the object is absent.
    pub fn not_found() -> Self {
        Self {
            found: false,
            coords: [0.0; 4],
            confidence: 0.0,
            description: String::new(),
        }
    }

    /// Whether the result is worth drawing at the given confidence threshold.
    pub fn passes(&self, threshold: f32) -> bool {
        self.found && self.confidence >= threshold
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::not_found()
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// A backend able to locate an object in an image.
///
/// The remote [`crate::AnthropicClient`] implements this; tests substitute their own.
pub trait DetectionModel {
    /// The error type that can be returned during detection.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one detection attempt.
    fn detect(&mut self, request: DetectionRequest) -> Result<DetectionResult, Self::Error>;
}
