//! Signal Decoder — encoded webcam payload to raster frame
//!
//! Clients send frames as data URLs (`data:image/jpeg;base64,...`) or as a
//! bare base64 string. Decoding never panics and never propagates an error
//! past the dispatcher: every failure is a [`DecodeFailure`] value.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::RgbImage;
use thiserror::Error;

/// Why a payload could not be turned into a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("no image payload")]
    Missing,

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("empty bitstream")]
    EmptyBitstream,

    #[error("undecodable image: {0}")]
    Undecodable(String),
}

/// A decoded RGB raster
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an existing raster
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying raster
    pub fn pixels(&self) -> &RgbImage {
        &self.image
    }
}

/// Strip an optional media-type header (`data:image/png;base64,`) from a payload
fn strip_header(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
}

/// Decode an encoded image payload into a raster frame.
pub fn decode_frame(payload: &str) -> Result<Frame, DecodeFailure> {
    let body = strip_header(payload).trim();
    if body.is_empty() {
        return Err(DecodeFailure::Missing);
    }

    let bytes = BASE64
        .decode(body)
        .map_err(|e| DecodeFailure::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(DecodeFailure::EmptyBitstream);
    }

    let decoded =
        image::load_from_memory(&bytes).map_err(|e| DecodeFailure::Undecodable(e.to_string()))?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(DecodeFailure::EmptyBitstream);
    }

    Ok(Frame::from_rgb(rgb))
}
