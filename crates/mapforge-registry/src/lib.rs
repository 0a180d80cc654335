//! # Mapforge Registry
//!
//! Marker assets, the placement approval workflow and versioned map layers,
//! built on the `mapforge` image core.
//!
//! ## Features
//!
//! - **Asset store**: validated, normalized marker uploads under generated names
//! - **Placement registry**: submission, review and a startup consistency pass
//! - **Version ledger**: per-map version numbers with in-process reservations
//! - **Exporter**: concurrent per-placement rendering and one-pass compositing
//! - **Pluggable storage**: file system or in-memory assets, SQLite metadata
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mapforge_registry::*;
//!
//! # async fn example() -> Result<()> {
//! let storage = Arc::new(FileSystemStorage::new(StorageLayout::under("./maps")).await?);
//! let metadata = Arc::new(SqliteStorage::new("sqlite:./data/mapforge.db").await?);
//! let registry = MapRegistry::new(storage, metadata, RegistryConfig::default());
//!
//! let outcome = registry.export(ExportRequest::new("Chernarus")).await?;
//! println!("wrote {} (v{})", outcome.path, outcome.version);
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod entities;
pub mod error;
pub mod exporter;
pub mod ledger;
pub mod placements;
pub mod registry;
pub mod storage;

// Re-export main types
pub use assets::AssetStore;
pub use entities::*;
pub use error::{RegistryError, Result};
pub use exporter::MapExporter;
pub use ledger::{VersionLedger, VersionReservation, output_name, validate_map_name};
pub use placements::PlacementRegistry;
pub use registry::{MapRegistry, RegistryConfig};
pub use storage::{
    AssetStorage, FileSystemStorage, MemoryStorage, MetadataStorage, StorageArea, StorageError,
    StorageLayout, StoredEntry, StoredFile,
};

#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;

// Re-export core types used in the public API
pub use mapforge::{CanvasSpec, GeometryAdjustment, MarkerLimits, PlacementGeometry};
