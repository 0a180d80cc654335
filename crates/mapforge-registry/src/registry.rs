//! The map registry: one handle over the asset store, placement registry,
//! version ledger and exporter, sharing the same storage backends

use std::sync::Arc;

use mapforge::{CanvasSpec, MarkerLimits};

use crate::assets::AssetStore;
use crate::entities::*;
use crate::error::Result;
use crate::exporter::MapExporter;
use crate::ledger::VersionLedger;
use crate::placements::PlacementRegistry;
use crate::storage::{AssetStorage, MetadataStorage};

/// Tunables of the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    pub limits: MarkerLimits,
    pub canvas: CanvasSpec,
}

pub struct MapRegistry {
    assets: AssetStore,
    placements: PlacementRegistry,
    ledger: Arc<VersionLedger>,
    exporter: MapExporter,
}

impl MapRegistry {
    /// Create a new registry with the given storage backends
    pub fn new(
        storage: Arc<dyn AssetStorage>,
        metadata: Arc<dyn MetadataStorage>,
        config: RegistryConfig,
    ) -> Self {
        let ledger = Arc::new(VersionLedger::new(storage.clone(), metadata.clone()));
        Self {
            assets: AssetStore::new(storage.clone(), metadata.clone(), config.limits),
            placements: PlacementRegistry::new(storage.clone(), metadata.clone()),
            exporter: MapExporter::new(storage, metadata, ledger.clone(), config.canvas),
            ledger,
        }
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn placements(&self) -> &PlacementRegistry {
        &self.placements
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub async fn ingest(&self, upload: Upload) -> Result<MarkerAsset> {
        self.assets.ingest(upload).await
    }

    pub fn asset_url(&self, asset: &MarkerAsset) -> String {
        self.assets.public_url(asset)
    }

    pub async fn submit_placement(&self, request: NewPlacement) -> Result<MarkerPlacement> {
        self.placements.submit_placement(request).await
    }

    pub async fn list_placements(&self, filter: &PlacementFilter) -> Result<Vec<MarkerPlacement>> {
        self.placements.list_placements(filter).await
    }

    pub async fn pending_placements(&self) -> Result<Vec<MarkerPlacement>> {
        self.placements.pending_placements().await
    }

    pub async fn review_placement(&self, id: i64, review: Review) -> Result<MarkerPlacement> {
        self.placements.review_placement(id, review).await
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.placements.reconcile().await
    }

    pub async fn export(&self, request: ExportRequest) -> Result<ExportOutcome> {
        self.exporter.export(request).await
    }

    pub async fn next_version(&self, map_name: &str) -> Result<u32> {
        self.ledger.next_version(map_name).await
    }

    pub async fn latest_layer(&self) -> Result<Option<MapLayer>> {
        self.ledger.latest_layer().await
    }

    pub async fn layers_for(&self, map_name: &str) -> Result<Vec<MapLayer>> {
        self.ledger.layers_for(map_name).await
    }

    pub async fn latest_files(&self) -> Result<LatestFiles> {
        self.ledger.latest_files().await
    }
}
