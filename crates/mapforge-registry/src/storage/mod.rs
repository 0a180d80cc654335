//! Storage abstraction for registry data

pub mod asset_storage;
pub mod filesystem;
pub mod metadata;

pub use asset_storage::{
    AssetStorage, MemoryStorage, StorageArea, StorageError, StoredEntry, StoredFile,
    validate_name,
};
pub use filesystem::{FileSystemStorage, StorageLayout};
pub use metadata::MetadataStorage;

// SQLite implementation
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
