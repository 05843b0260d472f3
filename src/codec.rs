//! Frame exchange boundary: base64-wrapped encoded images in, base64 JPEG out.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage, RgbaImage};

use crate::error::{Error, Result};

/// Strip an optional `data:<mime>;base64,` prefix.
fn payload_body(payload: &str) -> &str {
    let trimmed = payload.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, body)) = trimmed.split_once(',') {
            return body;
        }
    }
    trimmed
}

/// Decode an encoded image, not base64-wrapped, into RGB pixels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::EmptyImage);
    }
    Ok(image)
}

/// Decode a base64 payload (optionally a data URL) into RGB pixels.
pub fn decode_frame(payload: &str) -> Result<RgbImage> {
    let bytes = STANDARD.decode(payload_body(payload))?;
    decode_image(&bytes)
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(buf)
}

pub fn encode_frame(frame: &RgbImage, quality: u8) -> Result<String> {
    Ok(STANDARD.encode(encode_jpeg(frame, quality)?))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// PNG encoding used for thumbnails in library listings.
pub fn encode_png_base64(image: &RgbaImage) -> Result<String> {
    Ok(STANDARD.encode(encode_png(image)?))
}
