//! Metadata storage abstraction
//!
//! Rows for assets, placements and layers. Operations that must change
//! more than one row do so atomically inside the implementation.

use async_trait::async_trait;
use mapforge::PlacementGeometry;
use time::OffsetDateTime;

use crate::entities::*;
use crate::error::Result;
use crate::storage::StoredFile;

#[async_trait]
pub trait MetadataStorage: Send + Sync {
    /// Insert an asset with status `uploaded`
    async fn insert_asset(&self, asset: &NewAsset) -> Result<MarkerAsset>;

    async fn get_asset(&self, id: i64) -> Result<Option<MarkerAsset>>;

    /// Every asset, oldest first
    async fn list_assets(&self) -> Result<Vec<MarkerAsset>>;

    /// Point the asset at `location`, mark it pending and insert the
    /// placement, all in one transaction
    async fn claim_asset_for_placement(
        &self,
        location: &StoredFile,
        placement: &NewPlacement,
    ) -> Result<MarkerPlacement>;

    async fn get_placement(&self, id: i64) -> Result<Option<MarkerPlacement>>;

    /// Placements with `status`, optionally for one map, ordered by
    /// `created_at` then `id`
    async fn list_placements(
        &self,
        map_id: Option<&str>,
        status: PlacementStatus,
    ) -> Result<Vec<MarkerPlacement>>;

    /// Record a review on the placement and its asset in one transaction.
    /// Fails with `PlacementNotFound` when the id is unknown.
    async fn update_review(
        &self,
        id: i64,
        status: PlacementStatus,
        geometry: PlacementGeometry,
        reviewer_id: Option<i64>,
        reviewed_at: OffsetDateTime,
    ) -> Result<MarkerPlacement>;

    /// Approved placements of a map joined with their assets, in stacking order
    async fn approved_for_export(&self, map_name: &str) -> Result<Vec<ApprovedPlacement>>;

    async fn insert_layer(&self, layer: &NewLayer) -> Result<MapLayer>;

    /// Newest layer by creation time, ties broken by id
    async fn latest_layer(&self) -> Result<Option<MapLayer>>;

    /// Layers of one map, newest first
    async fn layers_for_map(&self, map_name: &str) -> Result<Vec<MapLayer>>;
}
