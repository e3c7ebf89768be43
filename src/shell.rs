//! One user action of the interactive shell, as a pure function of its inputs.
//!
//! The web front end collects the widgets' current values into a
//! [`ShellInputs`], calls [`run`], and renders whatever [`ShellOutcome`] says.

use crate::{
    codec::{self, DecodedImage},
    error::CodecError,
    model::{DetectionModel, DetectionRequest, DetectionResult},
    overlay::{self, OverlayStyle},
};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const MIN_THRESHOLD: f32 = 0.1;
pub const MAX_THRESHOLD: f32 = 1.0;

/// Current values of the shell's input widgets.
#[derive(Clone, Debug)]
pub struct ShellInputs {
    pub api_key: String,
    pub upload: Option<Vec<u8>>,
    pub prompt: String,
    pub threshold: f32,
}

impl Default for ShellInputs {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            upload: None,
            prompt: String::new(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A status message shown next to the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// What the result area shows.
pub enum ResultView {
    Empty,
    Original(DynamicImage),
    Annotated(RgbaImage),
}

pub struct ShellOutcome {
    pub view: ResultView,
    pub notices: Vec<Notice>,
    /// Set whenever a detection was attempted.
    pub detection: Option<DetectionResult>,
}

impl ShellOutcome {
    fn early(view: ResultView, notice: Notice) -> Self {
        Self {
            view,
            notices: vec![notice],
            detection: None,
        }
    }

    /// The displayed image as PNG bytes, if there is one.
    pub fn view_png(&self) -> Result<Option<Vec<u8>>, CodecError> {
        match &self.view {
            ResultView::Empty => Ok(None),
            ResultView::Original(image) => codec::encode_png(&image.to_rgba8()).map(Some),
            ResultView::Annotated(image) => codec::encode_png(image).map(Some),
        }
    }
}

/// Clamps a slider value into its range. Non-numbers fall back to the default.
pub fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        DEFAULT_THRESHOLD
    } else {
        threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }
}

/// Runs one detection round trip for the given inputs.
///
/// Never fails: every problem becomes a notice and the safest thing to show.
pub fn run<M: DetectionModel>(
    inputs: &ShellInputs,
    model: &mut M,
    style: &OverlayStyle,
) -> ShellOutcome {
    let threshold = clamp_threshold(inputs.threshold);
    let prompt = inputs.prompt.trim();

    let decoded = match inputs.upload.as_deref().filter(|bytes| !bytes.is_empty()) {
        None => None,
        Some(bytes) => match codec::decode(bytes) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Rejected upload: {}", e);
                return ShellOutcome::early(
                    ResultView::Empty,
                    Notice::new(
                        NoticeLevel::Error,
                        format!("Could not read the uploaded image: {e}"),
                    ),
                );
            }
        },
    };

    let decoded: DecodedImage = match (decoded, prompt.is_empty()) {
        (Some(decoded), false) => decoded,
        (decoded, _) => {
            let view = decoded.map_or(ResultView::Empty, |d| ResultView::Original(d.image));
            return ShellOutcome::early(
                view,
                Notice::new(
                    NoticeLevel::Info,
                    "Upload an image and enter a prompt to begin detection.",
                ),
            );
        }
    };

    if inputs.api_key.trim().is_empty() {
        return ShellOutcome::early(
            ResultView::Original(decoded.image),
            Notice::new(NoticeLevel::Error, "Please enter your API key."),
        );
    }

    let image = match codec::reencode(&decoded) {
        Ok(image) => image,
        Err(e) => {
            return ShellOutcome::early(
                ResultView::Original(decoded.image),
                Notice::new(NoticeLevel::Error, format!("Could not prepare the image: {e}")),
            );
        }
    };

    let mut notices = Vec::new();
    let request = DetectionRequest {
        image,
        label: prompt.to_string(),
        api_key: inputs.api_key.clone(),
    };

    let result = match model.detect(request) {
        Ok(result) => result,
        Err(e) => {
            log::warn!("Detection of '{}' failed: {}", prompt, e);
            notices.push(Notice::new(NoticeLevel::Error, format!("API Error: {e}")));
            DetectionResult::not_found()
        }
    };

    let view = if result.passes(threshold) {
        notices.push(Notice::new(
            NoticeLevel::Success,
            format!(
                "Detected '{}' at {} with {:.2}% confidence.",
                prompt,
                result.description,
                result.confidence * 100.0
            ),
        ));
        ResultView::Annotated(overlay::render(
            &decoded.image,
            result.coords,
            result.confidence,
            prompt,
            style,
        ))
    } else {
        notices.push(Notice::new(
            NoticeLevel::Warning,
            format!(
                "No '{}' detected above {:.0}% confidence.",
                prompt,
                threshold * 100.0
            ),
        ));
        ResultView::Original(decoded.image)
    };

    ShellOutcome {
        view,
        notices,
        detection: Some(result),
    }
}
