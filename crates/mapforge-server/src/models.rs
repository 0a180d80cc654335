//! API models for requests and responses

pub mod map;

// Re-export commonly used types
pub use map::*;
