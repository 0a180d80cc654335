//! PNG decode/encode helpers shared by normalization and compositing

use std::io::Cursor;

use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage, codecs::png::PngEncoder};

use crate::error::{ImageError, Result};

/// Decode PNG bytes into an RGBA8 buffer
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(ImageError::decode)
}

/// Encode an RGBA8 buffer as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    PngEncoder::new(&mut cursor)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(ImageError::encode)?;
    Ok(cursor.into_inner())
}
