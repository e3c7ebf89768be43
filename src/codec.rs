//! Decoding of uploaded images and re-encoding for transmission.
//!
//! The inference API accepts a handful of raster formats; uploads are limited
//! to PNG and JPEG. JPEG uploads stay JPEG on the wire, everything else is sent
//! as PNG.

use crate::error::CodecError;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Format of the bytes sent to the inference API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Jpeg,
    Png,
}

impl WireFormat {
    /// Picks the wire format for an image that arrived in `source` format.
    pub fn for_source(source: ImageFormat) -> Self {
        match source {
            ImageFormat::Jpeg => WireFormat::Jpeg,
            _ => WireFormat::Png,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            WireFormat::Jpeg => "image/jpeg",
            WireFormat::Png => "image/png",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            WireFormat::Jpeg => ImageFormat::Jpeg,
            WireFormat::Png => ImageFormat::Png,
        }
    }
}

/// An upload decoded into memory, remembering the format it came in.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Image bytes ready to embed in a request.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: WireFormat,
}

impl EncodedImage {
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    /// Standard, padded base64 of the bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Decodes an uploaded buffer. Only PNG and JPEG are accepted.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }

    let format = image::guess_format(bytes)
        .map_err(|_| CodecError::UnsupportedFormat("unknown".to_string()))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg => {}
        other => return Err(CodecError::UnsupportedFormat(format!("{other:?}"))),
    }

    let image = image::load_from_memory_with_format(bytes, format)?;
    log::debug!(
        "Decoded {:?} upload ({}x{})",
        format,
        image.width(),
        image.height()
    );

    Ok(DecodedImage { image, format })
}

/// Re-encodes a decoded upload in its wire format.
pub fn reencode(decoded: &DecodedImage) -> Result<EncodedImage, CodecError> {
    let format = WireFormat::for_source(decoded.format);
    let mut bytes = Vec::new();

    match format {
        // JPEG carries no alpha channel
        WireFormat::Jpeg => DynamicImage::ImageRgb8(decoded.image.to_rgb8())
            .write_to(&mut Cursor::new(&mut bytes), format.image_format())?,
        WireFormat::Png => decoded
            .image
            .write_to(&mut Cursor::new(&mut bytes), format.image_format())?,
    }

    Ok(EncodedImage { bytes, format })
}

/// Encodes an annotated image as PNG for display.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
