//! Locate a named object in an image with a remote vision-language model and
//! draw the answer as a translucent box over the image.
//!
//! The pieces run in sequence for every user action:
//!
//! 1. [`codec`] decodes the upload and re-encodes it for the wire,
//! 2. [`AnthropicClient`] asks the model where the object is,
//! 3. [`overlay`] turns the normalized answer into pixels and composites it,
//! 4. [`shell`] ties the three together for one set of widget values.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod overlay;
pub mod shell;

pub use client::AnthropicClient;
pub use config::ClientConfig;
pub use error::{CodecError, DetectError};
pub use model::{DetectionModel, DetectionRequest, DetectionResult};
pub use overlay::{ConfidenceTier, OverlayStyle, PixelBox};
pub use shell::{Notice, NoticeLevel, ResultView, ShellInputs, ShellOutcome};
