use thiserror::Error;

/// Errors raised while decoding an upload or re-encoding it for the wire.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("the uploaded image is empty")]
    Empty,

    #[error("unsupported image format: {0} (expected png or jpeg)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Errors returned by a detection call.
///
/// Every variant is recoverable: callers report it and treat the detection as
/// not found.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no API key was provided")]
    MissingCredential,

    #[error("no image data to send")]
    EmptyImage,

    #[error("no object label was provided")]
    EmptyLabel,

    #[error("request to the inference API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference API returned an error ({kind}): {message}")]
    Api { kind: String, message: String },

    #[error("inference API response is missing 'content'")]
    MissingContent,

    #[error("failed to parse JSON response from the model: {0}")]
    MalformedReply(#[from] serde_json::Error),

    #[error("model reported a match without coordinates")]
    MissingCoords,
}
