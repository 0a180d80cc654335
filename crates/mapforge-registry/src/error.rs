//! Error types for the mapforge registry

use mapforge::ImageError;
use thiserror::Error;

use crate::storage::StorageError;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid image format: only PNG images are accepted")]
    InvalidFormat,

    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Unknown asset: {0}")]
    UnknownAsset(i64),

    #[error("Placement not found: {0}")]
    PlacementNotFound(i64),

    #[error("Invalid placement geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid map name: {0:?}")]
    InvalidMapName(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Time error: {0}")]
    Time(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ImageError> for RegistryError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::InvalidFormat => Self::InvalidFormat,
            ImageError::TooLarge { size, limit } => Self::TooLarge { size, limit },
            ImageError::InvalidGeometry { reason } => Self::InvalidGeometry(reason),
            other @ (ImageError::Decode { .. } | ImageError::Encode { .. }) => {
                Self::Render(other.to_string())
            }
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
