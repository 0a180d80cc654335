//! Mapforge is the image core of the community map pipeline: it validates
//! and normalizes uploaded marker PNGs, transforms markers by scale and
//! rotation, and composites them onto a base map at normalized coordinates.
//!
//! Everything here is synchronous and works on in-memory buffers; storage,
//! versioning and concurrency live in `mapforge-registry`.

pub mod codec;
pub mod compose;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod rotate;

// Re-export core types
pub use codec::{decode_png, encode_png};
pub use compose::{
    CanvasSpec, OverlaySpec, PositionedOverlay, RenderedOverlay, blank_canvas, composite,
    composite_png, prepare_overlay, render_overlay,
};
pub use error::{ImageError, Result};
pub use geometry::{GeometryAdjustment, PlacementGeometry, paste_offset, scaled_size};
pub use normalize::{MarkerLimits, NormalizedMarker, fit_inside, normalize_marker};

// Re-export the image types that appear in public signatures
pub use image::{Rgba, RgbaImage};

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
