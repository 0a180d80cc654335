//! Asset storage abstraction for the registry
//!
//! Marker images, templates and composites live in four named areas. The
//! components never touch directories directly; they receive an
//! [`AssetStorage`] so tests can swap in [`MemoryStorage`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Invalid file name: {0:?}")]
    InvalidKey(String),
}

/// One of the directories the pipeline reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Fresh uploads
    Overlays,
    /// Markers referenced by a placement
    Awaiting,
    /// Base map templates, one per map name
    Templates,
    /// Versioned composites
    Current,
}

impl StorageArea {
    pub const ALL: [StorageArea; 4] = [
        StorageArea::Overlays,
        StorageArea::Awaiting,
        StorageArea::Templates,
        StorageArea::Current,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Overlays => "overlays",
            StorageArea::Awaiting => "awaiting",
            StorageArea::Templates => "templates",
            StorageArea::Current => "current",
        }
    }

    /// Directory name used under the map root by default
    pub fn default_dir(&self) -> &'static str {
        match self {
            StorageArea::Overlays => "overlays",
            StorageArea::Awaiting => "awaiting-approval",
            StorageArea::Templates => "template",
            StorageArea::Current => "current",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageArea {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overlays" => Ok(StorageArea::Overlays),
            "awaiting" => Ok(StorageArea::Awaiting),
            "templates" => Ok(StorageArea::Templates),
            "current" => Ok(StorageArea::Current),
            other => Err(StorageError::Backend(format!("Unknown storage area: {}", other))),
        }
    }
}

/// Location of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredFile {
    pub area: StorageArea,
    pub name: String,
}

impl StoredFile {
    pub fn new(area: StorageArea, name: impl Into<String>) -> Self {
        Self {
            area,
            name: name.into(),
        }
    }
}

impl fmt::Display for StoredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.area, self.name)
    }
}

/// A directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub name: String,
    pub modified: OffsetDateTime,
}

/// Reject names that could escape their area
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidKey(name.to_string()));
    }
    Ok(())
}

/// Abstraction for asset storage backends
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Store data under `name` in `area`, replacing any existing file
    async fn put(&self, area: StorageArea, name: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Retrieve a file
    async fn get(&self, area: StorageArea, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Check if a file exists
    async fn exists(&self, area: StorageArea, name: &str) -> Result<bool, StorageError>;

    /// Delete a file; deleting a missing file is not an error
    async fn delete(&self, area: StorageArea, name: &str) -> Result<(), StorageError>;

    /// Move a file to another area, keeping its name
    async fn relocate(
        &self,
        from: StorageArea,
        to: StorageArea,
        name: &str,
    ) -> Result<(), StorageError>;

    /// List the files of an area
    async fn list(&self, area: StorageArea) -> Result<Vec<StoredEntry>, StorageError>;

    /// Web-rooted path a client can fetch the file from
    fn public_path(&self, file: &StoredFile) -> String;
}

/// In-memory storage implementation for testing
#[derive(Debug)]
pub struct MemoryStorage {
    data: Mutex<HashMap<StoredFile, (Vec<u8>, OffsetDateTime)>>,
    public_prefix: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            public_prefix: "/maps".to_string(),
        }
    }

    /// Names stored in an area (useful for testing)
    pub fn names(&self, area: StorageArea) -> Vec<String> {
        let mut names: Vec<String> = self
            .data
            .lock()
            .map(|data| {
                data.keys()
                    .filter(|key| key.area == area)
                    .map(|key| key.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Get number of stored files
    pub fn len(&self) -> usize {
        self.data.lock().map(|data| data.len()).unwrap_or(0)
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<StoredFile, (Vec<u8>, OffsetDateTime)>>, StorageError>
    {
        self.data
            .lock()
            .map_err(|_| StorageError::Backend("Lock poisoned".into()))
    }
}

#[async_trait]
impl AssetStorage for MemoryStorage {
    async fn put(&self, area: StorageArea, name: &str, data: Vec<u8>) -> Result<(), StorageError> {
        validate_name(name)?;
        self.lock()?
            .insert(StoredFile::new(area, name), (data, OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn get(&self, area: StorageArea, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_name(name)?;
        let key = StoredFile::new(area, name);
        self.lock()?
            .get(&key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, area: StorageArea, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        Ok(self.lock()?.contains_key(&StoredFile::new(area, name)))
    }

    async fn delete(&self, area: StorageArea, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.lock()?.remove(&StoredFile::new(area, name));
        Ok(())
    }

    async fn relocate(
        &self,
        from: StorageArea,
        to: StorageArea,
        name: &str,
    ) -> Result<(), StorageError> {
        validate_name(name)?;
        let source = StoredFile::new(from, name);
        let mut data = self.lock()?;
        let entry = data
            .remove(&source)
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;
        data.insert(StoredFile::new(to, name), entry);
        Ok(())
    }

    async fn list(&self, area: StorageArea) -> Result<Vec<StoredEntry>, StorageError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(key, _)| key.area == area)
            .map(|(key, (_, modified))| StoredEntry {
                name: key.name.clone(),
                modified: *modified,
            })
            .collect())
    }

    fn public_path(&self, file: &StoredFile) -> String {
        format!("{}/{}/{}", self.public_prefix, file.area.default_dir(), file.name)
    }
}
