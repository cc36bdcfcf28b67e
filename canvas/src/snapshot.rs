//! Self-contained encoded snapshot of the raster.
//!
//! A snapshot is the raster encoded as PNG and then base64, the same payload
//! a browser canvas hands out as the tail of a `data:image/png;base64,` URL.
//! Taking a snapshot never touches the raster.

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

use crate::consts::PNG_MIME;
use crate::raster::Raster;

/// Errors produced while encoding or decoding snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The raster has zero area, so there is nothing to encode.
    #[error("raster is empty ({width}x{height})")]
    EmptyRaster { width: u32, height: u32 },

    /// PNG encoding failed.
    #[error("PNG encode failed: {0}")]
    Encode(String),

    /// PNG bytes or base64 text could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(String),
}

/// Inline image payload: base64 PNG tagged with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub mime_type: &'static str,
    /// Base64 (standard alphabet, padded) PNG bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    /// Encode the raster's current pixels.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::EmptyRaster`] for a zero-area raster and
    /// [`SnapshotError::Encode`] if PNG encoding fails.
    pub fn encode(raster: &Raster) -> Result<Self, SnapshotError> {
        if raster.is_empty() {
            return Err(SnapshotError::EmptyRaster { width: raster.width(), height: raster.height() });
        }
        let png = encode_png(raster)?;
        Ok(Self { mime_type: PNG_MIME, data: STANDARD.encode(&png), width: raster.width(), height: raster.height() })
    }

    /// The payload as a `data:` URL.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decoded size of the PNG payload in bytes, without decoding it.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        ((self.data.len() / 4) * 3).saturating_sub(padding)
    }

    /// Decode the payload back into a raster.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Decode`] if the base64 or PNG data is invalid.
    pub fn to_raster(&self) -> Result<Raster, SnapshotError> {
        let bytes = STANDARD.decode(&self.data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        decode_png(&bytes)
    }
}

fn encode_png(raster: &Raster) -> Result<Vec<u8>, SnapshotError> {
    let image = raster.as_image();
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)
        .map_err(|e| SnapshotError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode PNG bytes into a raster.
///
/// # Errors
///
/// Returns [`SnapshotError::Decode`] if the bytes are not a readable PNG.
pub fn decode_png(bytes: &[u8]) -> Result<Raster, SnapshotError> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(Raster::from_image(image.to_rgba8()))
}
