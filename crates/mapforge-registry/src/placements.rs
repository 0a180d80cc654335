//! Placement registry: submission, listing and the approval workflow

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::entities::*;
use crate::error::{RegistryError, Result};
use crate::storage::{AssetStorage, MetadataStorage, StorageArea, StoredFile};

pub struct PlacementRegistry {
    storage: Arc<dyn AssetStorage>,
    metadata: Arc<dyn MetadataStorage>,
}

impl PlacementRegistry {
    pub fn new(storage: Arc<dyn AssetStorage>, metadata: Arc<dyn MetadataStorage>) -> Self {
        Self { storage, metadata }
    }

    /// Submit a placement for review.
    ///
    /// The asset file is moved into the awaiting area first; the asset
    /// update and the placement insert then commit together. If the commit
    /// fails the file is moved back.
    pub async fn submit_placement(&self, request: NewPlacement) -> Result<MarkerPlacement> {
        request.geometry.validate()?;

        let asset = self
            .metadata
            .get_asset(request.asset_id)
            .await?
            .ok_or(RegistryError::UnknownAsset(request.asset_id))?;

        let from = asset.location.area;
        let target = StoredFile::new(StorageArea::Awaiting, asset.location.name.clone());
        let moved = from != StorageArea::Awaiting;
        if moved {
            self.storage
                .relocate(from, StorageArea::Awaiting, &target.name)
                .await?;
        }

        match self.metadata.claim_asset_for_placement(&target, &request).await {
            Ok(placement) => {
                info!(
                    placement_id = placement.id,
                    asset_id = placement.asset_id,
                    map_id = ?placement.map_id,
                    "Submitted marker placement"
                );
                Ok(placement)
            }
            Err(err) => {
                if moved {
                    if let Err(undo) = self
                        .storage
                        .relocate(StorageArea::Awaiting, from, &target.name)
                        .await
                    {
                        error!(
                            asset_id = asset.id,
                            file = %target,
                            error = %undo,
                            "Failed to move marker back after rejected submission"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Placements matching the filter, approved ones by default
    pub async fn list_placements(&self, filter: &PlacementFilter) -> Result<Vec<MarkerPlacement>> {
        let status = filter.status.unwrap_or_default();
        debug!(map_id = ?filter.map_id, %status, "Listing placements");
        self.metadata
            .list_placements(filter.map_id.as_deref(), status)
            .await
    }

    pub async fn pending_placements(&self) -> Result<Vec<MarkerPlacement>> {
        self.metadata
            .list_placements(None, PlacementStatus::Pending)
            .await
    }

    pub async fn get_placement(&self, id: i64) -> Result<MarkerPlacement> {
        self.metadata
            .get_placement(id)
            .await?
            .ok_or(RegistryError::PlacementNotFound(id))
    }

    /// Record a review decision, optionally adjusting the geometry.
    ///
    /// `reviewed_at` and `reviewed_by` are stamped for every decision and
    /// the asset's status follows the placement's.
    pub async fn review_placement(&self, id: i64, review: Review) -> Result<MarkerPlacement> {
        let current = self.get_placement(id).await?;
        let geometry = review.adjustment.apply(current.geometry);
        geometry.validate()?;

        let placement = self
            .metadata
            .update_review(
                id,
                review.status,
                geometry,
                review.reviewer_id,
                OffsetDateTime::now_utc(),
            )
            .await?;

        info!(
            placement_id = id,
            status = %placement.status,
            reviewer_id = ?placement.reviewed_by,
            "Reviewed marker placement"
        );
        Ok(placement)
    }

    /// Bring the asset directories back in line with the metadata.
    ///
    /// A file found in the sibling area of its recorded location is moved
    /// back; a file missing everywhere is reported as orphaned.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for asset in self.metadata.list_assets().await? {
            let StoredFile { area, name } = &asset.location;
            if self.storage.exists(*area, name).await? {
                continue;
            }

            let sibling = match area {
                StorageArea::Overlays => StorageArea::Awaiting,
                StorageArea::Awaiting => StorageArea::Overlays,
                other => *other,
            };

            if sibling != *area && self.storage.exists(sibling, name).await? {
                self.storage.relocate(sibling, *area, name).await?;
                report.restored += 1;
                info!(asset_id = asset.id, from = %sibling, to = %area, "Restored marker file");
            } else {
                report.orphaned += 1;
                warn!(asset_id = asset.id, file = %asset.location, "Marker file is missing");
            }
        }

        info!(
            restored = report.restored,
            orphaned = report.orphaned,
            "Reconciled marker storage"
        );
        Ok(report)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SqliteStorage};
    use mapforge::{GeometryAdjustment, PlacementGeometry};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        storage: Arc<MemoryStorage>,
        metadata: Arc<SqliteStorage>,
        registry: PlacementRegistry,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("placements.db").display());
        let metadata = Arc::new(SqliteStorage::new(&url).await.unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let registry = PlacementRegistry::new(storage.clone(), metadata.clone());
        Fixture {
            _dir: dir,
            storage,
            metadata,
            registry,
        }
    }

    async fn uploaded_asset(fixture: &Fixture, name: &str) -> MarkerAsset {
        fixture
            .storage
            .put(StorageArea::Overlays, name, vec![0])
            .await
            .unwrap();
        fixture
            .metadata
            .insert_asset(&NewAsset {
                uploader_id: None,
                original_filename: "m.png".to_string(),
                location: StoredFile::new(StorageArea::Overlays, name),
                width: 10,
                height: 10,
            })
            .await
            .unwrap()
    }

    fn centered() -> PlacementGeometry {
        PlacementGeometry::new(0.5, 0.5, 1.0, 0.0)
    }

    #[tokio::test]
    async fn test_submit_moves_file_and_marks_pending() {
        let fixture = fixture().await;
        let asset = uploaded_asset(&fixture, "a.png").await;

        let placement = fixture
            .registry
            .submit_placement(NewPlacement::new(asset.id, centered()).on_map("Chernarus"))
            .await
            .unwrap();

        assert_eq!(placement.status, PlacementStatus::Pending);
        assert!(fixture.storage.names(StorageArea::Overlays).is_empty());
        assert_eq!(fixture.storage.names(StorageArea::Awaiting), vec!["a.png".to_string()]);

        let asset = fixture.metadata.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(asset.location.area, StorageArea::Awaiting);
        assert_eq!(asset.status, AssetStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_asset_changes_nothing() {
        let fixture = fixture().await;
        let result = fixture
            .registry
            .submit_placement(NewPlacement::new(404, centered()))
            .await;

        assert!(matches!(result, Err(RegistryError::UnknownAsset(404))));
        assert!(fixture.registry.pending_placements().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_rejects_submission() {
        let fixture = fixture().await;
        let asset = uploaded_asset(&fixture, "gone.png").await;
        fixture
            .storage
            .delete(StorageArea::Overlays, "gone.png")
            .await
            .unwrap();

        let result = fixture
            .registry
            .submit_placement(NewPlacement::new(asset.id, centered()))
            .await;
        assert!(matches!(result, Err(RegistryError::Storage(_))));
        assert!(fixture.registry.pending_placements().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_scale_is_rejected() {
        let fixture = fixture().await;
        let asset = uploaded_asset(&fixture, "s.png").await;
        let result = fixture
            .registry
            .submit_placement(NewPlacement::new(
                asset.id,
                PlacementGeometry::new(0.5, 0.5, 0.0, 0.0),
            ))
            .await;

        assert!(matches!(result, Err(RegistryError::InvalidGeometry(_))));
        assert_eq!(fixture.storage.names(StorageArea::Overlays), vec!["s.png".to_string()]);
    }

    #[tokio::test]
    async fn test_review_stamps_reviewer_and_adjusts_geometry() {
        let fixture = fixture().await;
        let asset = uploaded_asset(&fixture, "r.png").await;
        let placement = fixture
            .registry
            .submit_placement(NewPlacement::new(asset.id, centered()).on_map("Livonia"))
            .await
            .unwrap();

        let mut review = Review::reject(Some(11));
        review.adjustment = GeometryAdjustment {
            scale: Some(0.5),
            ..GeometryAdjustment::default()
        };
        let reviewed = fixture
            .registry
            .review_placement(placement.id, review)
            .await
            .unwrap();

        assert_eq!(reviewed.status, PlacementStatus::Rejected);
        assert_eq!(reviewed.reviewed_by, Some(11));
        assert!(reviewed.reviewed_at.is_some());
        assert_eq!(reviewed.geometry.scale, 0.5);
        assert_eq!(reviewed.geometry.x_norm, 0.5);

        let asset = fixture.metadata.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Rejected);
    }

    #[tokio::test]
    async fn test_review_unknown_placement() {
        let fixture = fixture().await;
        let result = fixture
            .registry
            .review_placement(77, Review::approve(None))
            .await;
        assert!(matches!(result, Err(RegistryError::PlacementNotFound(77))));
    }

    #[tokio::test]
    async fn test_listing_defaults_to_approved_in_submission_order() {
        let fixture = fixture().await;
        let mut ids = Vec::new();
        for name in ["1.png", "2.png", "3.png"] {
            let asset = uploaded_asset(&fixture, name).await;
            let placement = fixture
                .registry
                .submit_placement(NewPlacement::new(asset.id, centered()).on_map("Chernarus"))
                .await
                .unwrap();
            ids.push(placement.id);
        }
        for id in [ids[2], ids[0]] {
            fixture
                .registry
                .review_placement(id, Review::approve(Some(1)))
                .await
                .unwrap();
        }

        let approved = fixture
            .registry
            .list_placements(&PlacementFilter::default())
            .await
            .unwrap();
        let approved_ids: Vec<i64> = approved.iter().map(|p| p.id).collect();
        assert_eq!(approved_ids, vec![ids[0], ids[2]]);

        let pending = fixture.registry.pending_placements().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_reconcile_moves_files_back_to_recorded_area() {
        let fixture = fixture().await;
        let stray = uploaded_asset(&fixture, "stray.png").await;
        let _orphan = uploaded_asset(&fixture, "orphan.png").await;
        let _fine = uploaded_asset(&fixture, "fine.png").await;

        // a move whose transaction never committed
        fixture
            .storage
            .relocate(StorageArea::Overlays, StorageArea::Awaiting, "stray.png")
            .await
            .unwrap();
        fixture
            .storage
            .delete(StorageArea::Overlays, "orphan.png")
            .await
            .unwrap();

        let report = fixture.registry.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport { restored: 1, orphaned: 1 });
        assert!(fixture
            .storage
            .exists(StorageArea::Overlays, &stray.location.name)
            .await
            .unwrap());
        assert!(fixture.storage.names(StorageArea::Awaiting).is_empty());
    }
}
