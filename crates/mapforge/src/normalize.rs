//! Upload validation and marker normalization
//!
//! Uploaded markers are checked against a byte limit before anything is
//! decoded, must be PNG, and are shrunk to fit inside a square bound with
//! their aspect ratio preserved. Images already inside the bound keep their
//! size.

use image::{ImageFormat, imageops::FilterType};

use crate::codec::{decode_png, encode_png};
use crate::error::{ImageError, Result};

/// Default upload byte limit (2 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Default bound for the longest marker side, in pixels
pub const DEFAULT_MAX_DIMENSION: u32 = 512;

/// Limits applied to uploaded marker images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerLimits {
    pub max_bytes: usize,
    pub max_dimension: u32,
}

impl Default for MarkerLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// A marker re-encoded as PNG after normalization
#[derive(Debug, Clone)]
pub struct NormalizedMarker {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Reject anything that does not carry a PNG signature
pub fn ensure_png(bytes: &[u8]) -> Result<()> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok(()),
        _ => Err(ImageError::InvalidFormat),
    }
}

/// Dimensions that fit inside `bound x bound` with the aspect ratio kept.
///
/// Returns the input unchanged when it already fits.
pub fn fit_inside(width: u32, height: u32, bound: u32) -> (u32, u32) {
    if width <= bound && height <= bound {
        return (width, height);
    }
    let ratio = f64::min(
        bound as f64 / width as f64,
        bound as f64 / height as f64,
    );
    let fit = |v: u32| (((v as f64) * ratio).round() as u32).clamp(1, bound);
    (fit(width), fit(height))
}

/// Validate and normalize an uploaded marker.
///
/// The size check runs first so oversized uploads are never decoded.
pub fn normalize_marker(bytes: &[u8], limits: &MarkerLimits) -> Result<NormalizedMarker> {
    if bytes.len() > limits.max_bytes {
        return Err(ImageError::TooLarge {
            size: bytes.len(),
            limit: limits.max_bytes,
        });
    }
    ensure_png(bytes)?;

    let decoded = decode_png(bytes).map_err(|_| ImageError::InvalidFormat)?;
    let (width, height) = fit_inside(decoded.width(), decoded.height(), limits.max_dimension);

    let normalized = if (width, height) == decoded.dimensions() {
        decoded
    } else {
        image::imageops::resize(&decoded, width, height, FilterType::Lanczos3)
    };

    Ok(NormalizedMarker {
        png: encode_png(&normalized)?,
        width,
        height,
    })
}
