//! Image payload decoding.
//!
//! Clients send images either as base64 text (optionally behind a data-URI
//! header) or as raw multipart bytes. Both end up as an 8-bit RGB buffer.

use axum::body::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("empty image payload")]
    Empty,
}

/// An image as submitted by the client.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    Base64(String),
    Multipart(Bytes),
}

/// A decoded 3-channel RGB image.
#[derive(Debug, Clone)]
pub struct DecodedImage(RgbImage);

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_rgb(self) -> RgbImage {
        self.0
    }
}

impl From<RgbImage> for DecodedImage {
    fn from(image: RgbImage) -> Self {
        Self(image)
    }
}

pub fn decode(payload: &ImagePayload) -> Result<DecodedImage, DecodeError> {
    match payload {
        ImagePayload::Base64(text) => decode_base64(text),
        ImagePayload::Multipart(bytes) => decode_bytes(bytes),
    }
}

/// Decode base64 text. Anything up to and including the first comma is
/// treated as a data-URI header and dropped, as is ASCII whitespace.
pub fn decode_base64(text: &str) -> Result<DecodedImage, DecodeError> {
    let payload = match text.split_once(',') {
        Some((_, rest)) => rest,
        None => text,
    };
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(compact.as_bytes())?;
    decode_bytes(&bytes)
}

/// Decode an encoded image container, guessing the format from its magic bytes.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    Ok(DecodedImage(image.to_rgb8()))
}
