//! Error types for the mapforge image core
//!
//! Every operation in this crate works on in-memory buffers, so the error
//! hierarchy is flat: it covers upload validation, codec failures and
//! placement geometry that cannot be rendered.

use thiserror::Error;

/// Main error type for image operations
#[derive(Error, Debug)]
pub enum ImageError {
    /// The upload is not a PNG, or its PNG stream cannot be decoded
    #[error("Invalid image format: only PNG images are accepted")]
    InvalidFormat,

    /// The upload exceeds the configured byte limit
    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    /// A stored image could not be decoded while rendering
    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    /// PNG encoding failed
    #[error("Failed to encode image: {reason}")]
    Encode { reason: String },

    /// Scale or rotation values that cannot produce an image
    #[error("Invalid placement geometry: {reason}")]
    InvalidGeometry { reason: String },
}

impl ImageError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }

    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode {
            reason: err.to_string(),
        }
    }

    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }
}

/// Result type alias for image operations
pub type Result<T> = std::result::Result<T, ImageError>;
