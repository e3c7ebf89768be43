use serde::{Deserialize, Serialize};
use vlm_locate::{DetectionResult, Notice};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectResponse {
    pub notices: Vec<Notice>,
    /// base64 PNG of the image to display, if any
    pub image: Option<String>,
    pub detection: Option<DetectionResult>,
}
