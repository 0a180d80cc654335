//! Map compositing
//!
//! A composite is built in two phases. Each placement is first turned into a
//! [`PositionedOverlay`] on its own; these renders are independent and
//! can run in parallel. The overlays are then painted onto a copy of the
//! base image in one pass, in the order they are given. Later overlays paint
//! over earlier ones where they intersect.

use image::{Rgba, RgbaImage, imageops, imageops::FilterType};

use crate::codec::{decode_png, encode_png};
use crate::error::{ImageError, Result};
use crate::geometry::{checked_scaled_size, paste_offset};
use crate::rotate::rotate_expand;

/// Default blank template size
pub const DEFAULT_CANVAS_SIZE: u32 = 2048;

/// Default blank template color (#1e1e1e)
pub const DEFAULT_CANVAS_COLOR: [u8; 4] = [0x1e, 0x1e, 0x1e, 0xff];

/// Blank template used when a map has no uploaded base image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    pub background: [u8; 4],
}

impl Default for CanvasSpec {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_SIZE,
            height: DEFAULT_CANVAS_SIZE,
            background: DEFAULT_CANVAS_COLOR,
        }
    }
}

/// Synthesize a blank template
pub fn blank_canvas(spec: &CanvasSpec) -> RgbaImage {
    RgbaImage::from_pixel(spec.width, spec.height, Rgba(spec.background))
}

/// How a single marker is transformed before being pasted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySpec {
    /// Recorded pixel width of the marker asset
    pub width: u32,
    /// Recorded pixel height of the marker asset
    pub height: u32,
    pub scale: f64,
    pub rotation_deg: f64,
}

/// A transformed marker ready to be pasted
#[derive(Debug, Clone)]
pub struct RenderedOverlay {
    pub image: RgbaImage,
}

impl RenderedOverlay {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A rendered overlay with its top-left paste position on the base
#[derive(Debug, Clone)]
pub struct PositionedOverlay {
    pub overlay: RenderedOverlay,
    pub left: i64,
    pub top: i64,
}

impl PositionedOverlay {
    /// Position `overlay` so its center lands on the normalized point
    pub fn centered(
        overlay: RenderedOverlay,
        base_width: u32,
        base_height: u32,
        x_norm: f64,
        y_norm: f64,
    ) -> Self {
        let (left, top) = paste_offset(
            base_width,
            base_height,
            x_norm,
            y_norm,
            overlay.width(),
            overlay.height(),
        );
        Self { overlay, left, top }
    }
}

/// Resize `image` to exactly `width x height` with a "contain" fit.
///
/// The aspect ratio is kept; any leftover area is transparent and the image
/// is centered in it.
pub fn contain(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }

    let ratio = f64::min(
        width as f64 / image.width() as f64,
        height as f64 / image.height() as f64,
    );
    let fit_w = ((image.width() as f64 * ratio).round() as u32).clamp(1, width);
    let fit_h = ((image.height() as f64 * ratio).round() as u32).clamp(1, height);
    let resized = imageops::resize(image, fit_w, fit_h, FilterType::Lanczos3);

    if (fit_w, fit_h) == (width, height) {
        return resized;
    }

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(
        &mut canvas,
        &resized,
        ((width - fit_w) / 2) as i64,
        ((height - fit_h) / 2) as i64,
    );
    canvas
}

/// Decode a marker and apply its scale and rotation.
///
/// Sizes whose rotated bounds exceed [`MAX_OVERLAY_SIDE`](crate::geometry::MAX_OVERLAY_SIDE)
/// are rejected with `InvalidGeometry` before decoding.
pub fn render_overlay(source: &[u8], spec: &OverlaySpec) -> Result<RenderedOverlay> {
    let (width, height) = checked_scaled_size(spec.width, spec.height, spec.scale)?;
    if !spec.rotation_deg.is_finite() {
        return Err(ImageError::geometry("rotation must be a finite number"));
    }
    let decoded = decode_png(source)?;
    let fitted = contain(&decoded, width, height);
    Ok(RenderedOverlay {
        image: rotate_expand(&fitted, spec.rotation_deg),
    })
}

/// Render a marker and position it on a base of the given size
pub fn prepare_overlay(
    source: &[u8],
    spec: &OverlaySpec,
    base_size: (u32, u32),
    x_norm: f64,
    y_norm: f64,
) -> Result<PositionedOverlay> {
    let overlay = render_overlay(source, spec)?;
    Ok(PositionedOverlay::centered(
        overlay,
        base_size.0,
        base_size.1,
        x_norm,
        y_norm,
    ))
}

/// Paint every overlay onto a copy of `base`, clipping off-canvas parts
pub fn composite(base: &RgbaImage, overlays: &[PositionedOverlay]) -> RgbaImage {
    let mut output = base.clone();
    for positioned in overlays {
        imageops::overlay(
            &mut output,
            &positioned.overlay.image,
            positioned.left,
            positioned.top,
        );
    }
    output
}

/// Composite onto a PNG-encoded base and return PNG bytes
pub fn composite_png(base_png: &[u8], overlays: &[PositionedOverlay]) -> Result<Vec<u8>> {
    let base = decode_png(base_png)?;
    encode_png(&composite(&base, overlays))
}
