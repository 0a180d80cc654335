//! Version ledger: per-map version numbers and layer records
//!
//! Versions are derived from the composites present in the current area.
//! Exports go through [`VersionLedger::reserve`], which serializes work on
//! one map inside this process and remembers the last version handed out,
//! so two exports of the same map never share a number. Exports of
//! different maps do not block each other. Nothing here coordinates
//! separate processes writing to the same directory.
//!
//! A map's slot only lives while an export of it is running or waiting.
//! Once idle, the composites on disk carry the version forward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::entities::{LatestFiles, MapLayer, NewLayer};
use crate::error::{RegistryError, Result};
use crate::storage::{
    AssetStorage, MetadataStorage, StorageArea, StoredEntry, StoredFile, validate_name,
};

/// Reject map names that cannot be used as a file name stem
pub fn validate_map_name(map_name: &str) -> Result<()> {
    if map_name.trim().is_empty() || map_name.contains("..") {
        return Err(RegistryError::InvalidMapName(map_name.to_string()));
    }
    validate_name(map_name).map_err(|_| RegistryError::InvalidMapName(map_name.to_string()))
}

/// File name of a composite: `{map}_v{NNN}.png`
pub fn output_name(map_name: &str, version: u32) -> String {
    format!("{}_v{:03}.png", map_name, version)
}

/// Template file name of a map
pub fn template_name(map_name: &str) -> String {
    format!("{}.png", map_name)
}

/// Parse the version out of `{map}_v{NNN}.png`, at least three digits
fn parse_version(map_name: &str, file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(map_name)?
        .strip_prefix("_v")?
        .strip_suffix(".png")?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Exclusive right to write the next composite of one map
#[derive(Debug)]
pub struct VersionReservation {
    map_name: String,
    version: u32,
    last_allocated: OwnedMutexGuard<u32>,
}

impl VersionReservation {
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Mark the version as used by exports already waiting on this map.
    /// Dropping without committing lets the next export reuse it.
    pub fn commit(mut self) {
        *self.last_allocated = self.version;
    }
}

pub struct VersionLedger {
    storage: Arc<dyn AssetStorage>,
    metadata: Arc<dyn MetadataStorage>,
    reservations: Mutex<HashMap<String, Arc<AsyncMutex<u32>>>>,
}

impl VersionLedger {
    pub fn new(storage: Arc<dyn AssetStorage>, metadata: Arc<dyn MetadataStorage>) -> Self {
        Self {
            storage,
            metadata,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Next version for a map, derived from the composites on disk.
    ///
    /// Read-only: calling it twice without writing returns the same value.
    pub async fn next_version(&self, map_name: &str) -> Result<u32> {
        validate_map_name(map_name)?;
        let entries = self.storage.list(StorageArea::Current).await?;

        let versions: Vec<u32> = entries
            .iter()
            .filter_map(|entry| parse_version(map_name, &entry.name))
            .collect();
        let count = versions.len() as u32;
        let highest = versions.iter().copied().max().unwrap_or(0);

        Ok(count.max(highest) + 1)
    }

    /// Reserve the next version of a map, waiting for any export of the
    /// same map already in flight
    pub async fn reserve(&self, map_name: &str) -> Result<VersionReservation> {
        validate_map_name(map_name)?;

        let slot = {
            let mut reservations = self
                .reservations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Holders and waiters keep a clone of the slot
            reservations.retain(|name, slot| name == map_name || Arc::strong_count(slot) > 1);
            reservations
                .entry(map_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(0)))
                .clone()
        };

        let last_allocated = slot.lock_owned().await;
        let scanned = self.next_version(map_name).await?;
        let version = scanned.max(*last_allocated + 1);
        debug!(map_name, version, scanned, "Reserved map version");

        Ok(VersionReservation {
            map_name: map_name.to_string(),
            version,
            last_allocated,
        })
    }

    #[cfg(test)]
    fn tracked_maps(&self) -> usize {
        self.reservations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub async fn record_layer(&self, layer: &NewLayer) -> Result<MapLayer> {
        self.metadata.insert_layer(layer).await
    }

    /// Most recently created layer of any map
    pub async fn latest_layer(&self) -> Result<Option<MapLayer>> {
        self.metadata.latest_layer().await
    }

    /// Layer history of one map, newest first
    pub async fn layers_for(&self, map_name: &str) -> Result<Vec<MapLayer>> {
        validate_map_name(map_name)?;
        self.metadata.layers_for_map(map_name).await
    }

    /// Most recently modified template and composite
    pub async fn latest_files(&self) -> Result<LatestFiles> {
        Ok(LatestFiles {
            template: self.newest_png(StorageArea::Templates).await?,
            current: self.newest_png(StorageArea::Current).await?,
        })
    }

    async fn newest_png(&self, area: StorageArea) -> Result<Option<String>> {
        let entries = self.storage.list(area).await?;
        let newest = entries
            .into_iter()
            .filter(|entry| entry.name.to_ascii_lowercase().ends_with(".png"))
            .max_by(|a: &StoredEntry, b: &StoredEntry| {
                a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name))
            });

        Ok(newest.map(|entry| self.storage.public_path(&StoredFile::new(area, entry.name))))
    }
}
