//! Asset store: validates, normalizes and stores uploaded marker images

use std::sync::Arc;

use mapforge::{MarkerLimits, normalize_marker};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{MarkerAsset, NewAsset, Upload};
use crate::error::Result;
use crate::storage::{AssetStorage, MetadataStorage, StorageArea, StoredFile};

pub struct AssetStore {
    storage: Arc<dyn AssetStorage>,
    metadata: Arc<dyn MetadataStorage>,
    limits: MarkerLimits,
}

impl AssetStore {
    pub fn new(
        storage: Arc<dyn AssetStorage>,
        metadata: Arc<dyn MetadataStorage>,
        limits: MarkerLimits,
    ) -> Self {
        Self {
            storage,
            metadata,
            limits,
        }
    }

    pub fn limits(&self) -> &MarkerLimits {
        &self.limits
    }

    /// Validate, normalize and store an upload.
    ///
    /// Nothing is written when validation fails. The stored file gets a
    /// fresh `{uuid}.png` name; the uploader's filename is only recorded.
    pub async fn ingest(&self, upload: Upload) -> Result<MarkerAsset> {
        let limits = self.limits;
        let Upload {
            original_filename,
            bytes,
            uploader_id,
        } = upload;

        let normalized =
            tokio::task::spawn_blocking(move || normalize_marker(&bytes, &limits)).await??;

        let location = StoredFile::new(StorageArea::Overlays, format!("{}.png", Uuid::new_v4()));
        self.storage
            .put(location.area, &location.name, normalized.png)
            .await?;

        let new_asset = NewAsset {
            uploader_id,
            original_filename,
            location: location.clone(),
            width: normalized.width,
            height: normalized.height,
        };

        match self.metadata.insert_asset(&new_asset).await {
            Ok(asset) => {
                info!(
                    asset_id = asset.id,
                    file = %asset.location,
                    width = asset.width,
                    height = asset.height,
                    "Ingested marker asset"
                );
                Ok(asset)
            }
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(location.area, &location.name).await {
                    warn!(file = %location, error = %cleanup, "Failed to remove orphaned upload");
                }
                Err(err)
            }
        }
    }

    pub async fn get_asset(&self, id: i64) -> Result<Option<MarkerAsset>> {
        self.metadata.get_asset(id).await
    }

    /// Web-rooted URL of the asset's current file
    pub fn public_url(&self, asset: &MarkerAsset) -> String {
        self.storage.public_path(&asset.location)
    }
}
