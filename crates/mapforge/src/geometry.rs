//! Placement geometry on a base map
//!
//! Positions are normalized to the base image: `x_norm = 0.5, y_norm = 0.5`
//! is the center of the map whatever its pixel size. The normalized point
//! addresses the CENTER of the placed marker, not its top-left corner.

use serde::{Deserialize, Serialize};

use crate::error::{ImageError, Result};

/// Largest accepted scale factor
pub const MAX_SCALE: f64 = 16.0;

/// Largest side, in pixels, of a rendered overlay including its rotated bounds
pub const MAX_OVERLAY_SIDE: u32 = 12_288;

/// Position, scale and rotation of a marker on a map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementGeometry {
    /// Horizontal position as a fraction of the base width
    pub x_norm: f64,
    /// Vertical position as a fraction of the base height
    pub y_norm: f64,
    /// Multiplier applied to the marker's pixel dimensions
    pub scale: f64,
    /// Clockwise rotation in degrees
    #[serde(default)]
    pub rotation_deg: f64,
}

impl PlacementGeometry {
    pub fn new(x_norm: f64, y_norm: f64, scale: f64, rotation_deg: f64) -> Self {
        Self {
            x_norm,
            y_norm,
            scale,
            rotation_deg,
        }
    }

    /// Check that the geometry can be rendered.
    ///
    /// Positions outside `[0, 1]` are accepted on purpose: they render
    /// partially or fully off-canvas. Non-finite numbers and a scale outside
    /// `(0, MAX_SCALE]` are rejected.
    pub fn validate(&self) -> Result<()> {
        if !self.x_norm.is_finite() || !self.y_norm.is_finite() {
            return Err(ImageError::geometry("position must be a finite number"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ImageError::geometry(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.scale > MAX_SCALE {
            return Err(ImageError::geometry(format!(
                "scale must be at most {MAX_SCALE}, got {}",
                self.scale
            )));
        }
        if !self.rotation_deg.is_finite() {
            return Err(ImageError::geometry("rotation must be a finite number"));
        }
        Ok(())
    }
}

/// Partial geometry update applied by a reviewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryAdjustment {
    pub x_norm: Option<f64>,
    pub y_norm: Option<f64>,
    pub scale: Option<f64>,
    pub rotation_deg: Option<f64>,
}

impl GeometryAdjustment {
    pub fn is_empty(&self) -> bool {
        self.x_norm.is_none()
            && self.y_norm.is_none()
            && self.scale.is_none()
            && self.rotation_deg.is_none()
    }

    /// Overlay the provided fields on top of `current`
    pub fn apply(&self, current: PlacementGeometry) -> PlacementGeometry {
        PlacementGeometry {
            x_norm: self.x_norm.unwrap_or(current.x_norm),
            y_norm: self.y_norm.unwrap_or(current.y_norm),
            scale: self.scale.unwrap_or(current.scale),
            rotation_deg: self.rotation_deg.unwrap_or(current.rotation_deg),
        }
    }
}

/// Pixel size of a marker after scaling, never smaller than 1x1
pub fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale_axis = |v: u32| ((v as f64) * scale).round().max(1.0) as u32;
    (scale_axis(width), scale_axis(height))
}

/// Like [`scaled_size`], but rejects sizes whose rotated bounds could exceed
/// [`MAX_OVERLAY_SIDE`] before any pixel buffer is allocated.
pub fn checked_scaled_size(width: u32, height: u32, scale: f64) -> Result<(u32, u32)> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ImageError::geometry(format!(
            "scale must be a positive number, got {scale}"
        )));
    }
    let scaled_w = ((width as f64) * scale).round().max(1.0);
    let scaled_h = ((height as f64) * scale).round().max(1.0);
    // Any rotation fits inside a square with the diagonal as its side
    let diagonal = scaled_w.hypot(scaled_h).ceil();
    if diagonal > MAX_OVERLAY_SIDE as f64 {
        return Err(ImageError::geometry(format!(
            "{width}x{height} marker at scale {scale} exceeds the {MAX_OVERLAY_SIDE} px render limit"
        )));
    }
    Ok((scaled_w as u32, scaled_h as u32))
}

/// Top-left paste offset that centers an overlay on a normalized point
pub fn paste_offset(
    base_width: u32,
    base_height: u32,
    x_norm: f64,
    y_norm: f64,
    overlay_width: u32,
    overlay_height: u32,
) -> (i64, i64) {
    let left = (base_width as f64) * x_norm - (overlay_width as f64) / 2.0;
    let top = (base_height as f64) * y_norm - (overlay_height as f64) / 2.0;
    (left.round() as i64, top.round() as i64)
}
