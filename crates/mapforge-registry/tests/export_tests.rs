use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use mapforge::{Rgba, RgbaImage, decode_png, encode_png};
use mapforge_registry::*;
use tempfile::TempDir;
use time::OffsetDateTime;

struct Harness {
    dir: TempDir,
    storage: Arc<FileSystemStorage>,
    metadata: Arc<SqliteStorage>,
    registry: Arc<MapRegistry>,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(
        FileSystemStorage::new(StorageLayout::under(dir.path().join("maps")))
            .await
            .unwrap(),
    );
    let url = format!("sqlite:{}", dir.path().join("mapforge.db").display());
    let metadata = Arc::new(SqliteStorage::new(&url).await.unwrap());
    let registry = Arc::new(MapRegistry::new(
        storage.clone(),
        metadata.clone(),
        RegistryConfig::default(),
    ));
    Harness {
        dir,
        storage,
        metadata,
        registry,
    }
}

fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
}

async fn approved_marker(harness: &Harness, map: &str, color: [u8; 4]) -> MarkerPlacement {
    let asset = harness
        .registry
        .ingest(Upload {
            original_filename: "marker.png".to_string(),
            bytes: solid_png(300, 300, color),
            uploader_id: Some(5),
        })
        .await
        .unwrap();
    let placement = harness
        .registry
        .submit_placement(
            NewPlacement::new(asset.id, PlacementGeometry::new(0.5, 0.5, 1.0, 0.0)).on_map(map),
        )
        .await
        .unwrap();
    harness
        .registry
        .review_placement(placement.id, Review::approve(Some(1)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_export_centers_marker() {
    let harness = harness().await;
    let red = [220, 20, 20, 255];
    approved_marker(&harness, "Chernarus", red).await;

    let outcome = harness
        .registry
        .export(ExportRequest::new("Chernarus"))
        .await
        .unwrap();

    assert_eq!(outcome.version, 1);
    assert_eq!(outcome.path, "/maps/current/Chernarus_v001.png");
    assert_eq!(outcome.layer.base_image_path, "/maps/template/Chernarus.png");

    let written = harness.dir.path().join("maps/current/Chernarus_v001.png");
    let output = decode_png(&std::fs::read(written).unwrap()).unwrap();
    assert_eq!(output.dimensions(), (2048, 2048));
    assert_eq!(output.get_pixel(1024, 1024), &Rgba(red));
    assert_eq!(output.get_pixel(874, 874), &Rgba(red));
    assert_eq!(output.get_pixel(873, 873), &Rgba([0x1e, 0x1e, 0x1e, 0xff]));

    // the synthesized template was persisted
    assert!(harness.dir.path().join("maps/template/Chernarus.png").is_file());
    assert_eq!(harness.registry.next_version("Chernarus").await.unwrap(), 2);

    let latest = harness.registry.latest_layer().await.unwrap().unwrap();
    assert_eq!(latest.id, outcome.layer.id);
    let files = harness.registry.latest_files().await.unwrap();
    assert_eq!(files.current.as_deref(), Some("/maps/current/Chernarus_v001.png"));
}

#[tokio::test]
async fn test_export_without_placements_copies_template() {
    let harness = harness().await;
    let mut template = RgbaImage::from_pixel(640, 360, Rgba([10, 60, 10, 255]));
    for x in 0..640 {
        template.put_pixel(x, (x * 7) % 360, Rgba([250, 250, (x % 256) as u8, 255]));
    }
    harness
        .storage
        .put(StorageArea::Templates, "Livonia.png", encode_png(&template).unwrap())
        .await
        .unwrap();

    // approved markers on other maps are ignored
    approved_marker(&harness, "Chernarus", [1, 2, 3, 255]).await;

    let outcome = harness
        .registry
        .export(ExportRequest::new("Livonia"))
        .await
        .unwrap();
    let written = harness
        .storage
        .get(StorageArea::Current, "Livonia_v001.png")
        .await
        .unwrap();
    assert_eq!(outcome.version, 1);
    assert_eq!(decode_png(&written).unwrap(), template);
}

#[tokio::test]
async fn test_consecutive_exports_increment_version() {
    let harness = harness().await;
    for expected in 1..=3 {
        let outcome = harness
            .registry
            .export(ExportRequest {
                map_name: "Sakhal".to_string(),
                season_id: Some(4),
            })
            .await
            .unwrap();
        assert_eq!(outcome.version, expected);
        assert_eq!(outcome.layer.season_id, Some(4));
    }

    let layers = harness.registry.layers_for("Sakhal").await.unwrap();
    let versions: Vec<u32> = layers.iter().map(|layer| layer.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exports_get_distinct_versions() {
    let harness = harness().await;
    approved_marker(&harness, "Chernarus", [0, 0, 255, 255]).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let registry = harness.registry.clone();
            tokio::spawn(async move { registry.export(ExportRequest::new("Chernarus")).await })
        })
        .collect();

    let mut versions = BTreeSet::new();
    for task in tasks {
        versions.insert(task.await.unwrap().unwrap().version);
    }
    assert_eq!(versions, BTreeSet::from([1, 2, 3, 4]));

    for version in 1..=4 {
        assert!(
            harness
                .storage
                .exists(StorageArea::Current, &output_name("Chernarus", version))
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_corrupt_marker_aborts_export() {
    let harness = harness().await;
    let placement = approved_marker(&harness, "Chernarus", [9, 9, 9, 255]).await;

    let asset = harness
        .registry
        .assets()
        .get_asset(placement.asset_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(asset.location.area, StorageArea::Awaiting);
    harness
        .storage
        .put(
            asset.location.area,
            &asset.location.name,
            b"\x89PNG\r\n\x1a\ncorrupted".to_vec(),
        )
        .await
        .unwrap();

    let result = harness.registry.export(ExportRequest::new("Chernarus")).await;
    assert!(matches!(result, Err(RegistryError::Render(_))));

    assert!(harness.storage.list(StorageArea::Current).await.unwrap().is_empty());
    assert!(harness.registry.latest_layer().await.unwrap().is_none());
    assert_eq!(harness.registry.next_version("Chernarus").await.unwrap(), 1);
}

#[tokio::test]
async fn test_review_rejects_oversized_scale() {
    let harness = harness().await;
    let placement = approved_marker(&harness, "Chernarus", [9, 9, 9, 255]).await;

    let mut review = Review::approve(Some(1));
    review.adjustment.scale = Some(1.0e6);
    let result = harness.registry.review_placement(placement.id, review).await;
    assert!(matches!(result, Err(RegistryError::InvalidGeometry(_))));

    let stored = harness.metadata.get_placement(placement.id).await.unwrap().unwrap();
    assert_eq!(stored.geometry.scale, 1.0);
}

#[tokio::test]
async fn test_oversized_stored_scale_fails_export_cleanly() {
    let harness = harness().await;
    let placement = approved_marker(&harness, "Chernarus", [9, 9, 9, 255]).await;

    // Rows written before the scale bound existed skip review validation
    let mut geometry = placement.geometry;
    geometry.scale = 1.0e6;
    harness
        .metadata
        .update_review(
            placement.id,
            PlacementStatus::Approved,
            geometry,
            Some(1),
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();

    let result = harness.registry.export(ExportRequest::new("Chernarus")).await;
    match result {
        Err(RegistryError::Render(message)) => {
            assert!(message.starts_with(&format!("placement {}", placement.id)), "{message}");
        }
        other => panic!("expected render error, got {other:?}"),
    }
    assert!(harness.storage.list(StorageArea::Current).await.unwrap().is_empty());
    assert_eq!(harness.registry.next_version("Chernarus").await.unwrap(), 1);
}

/// Writes a truncated composite into `current` and then reports failure
struct FailingCompositeStorage {
    inner: Arc<FileSystemStorage>,
}

#[async_trait]
impl AssetStorage for FailingCompositeStorage {
    async fn put(
        &self,
        area: StorageArea,
        name: &str,
        data: Vec<u8>,
    ) -> std::result::Result<(), StorageError> {
        if area != StorageArea::Current {
            return self.inner.put(area, name, data).await;
        }
        let half = data[..data.len() / 2].to_vec();
        self.inner.put(area, name, half).await?;
        Err(StorageError::Backend(format!("{area}/{name}: File too large")))
    }

    async fn get(&self, area: StorageArea, name: &str) -> std::result::Result<Vec<u8>, StorageError> {
        self.inner.get(area, name).await
    }

    async fn exists(&self, area: StorageArea, name: &str) -> std::result::Result<bool, StorageError> {
        self.inner.exists(area, name).await
    }

    async fn delete(&self, area: StorageArea, name: &str) -> std::result::Result<(), StorageError> {
        self.inner.delete(area, name).await
    }

    async fn relocate(
        &self,
        from: StorageArea,
        to: StorageArea,
        name: &str,
    ) -> std::result::Result<(), StorageError> {
        self.inner.relocate(from, to, name).await
    }

    async fn list(&self, area: StorageArea) -> std::result::Result<Vec<StoredEntry>, StorageError> {
        self.inner.list(area).await
    }

    fn public_path(&self, file: &StoredFile) -> String {
        self.inner.public_path(file)
    }
}

#[tokio::test]
async fn test_failed_composite_write_is_not_published() {
    let harness = harness().await;
    approved_marker(&harness, "Chernarus", [220, 20, 20, 255]).await;

    let failing = Arc::new(FailingCompositeStorage {
        inner: harness.storage.clone(),
    });
    let registry = MapRegistry::new(failing, harness.metadata.clone(), RegistryConfig::default());

    let result = registry.export(ExportRequest::new("Chernarus")).await;
    assert!(matches!(result, Err(RegistryError::Storage(StorageError::Backend(_)))));

    assert!(harness.storage.list(StorageArea::Current).await.unwrap().is_empty());
    assert!(registry.latest_layer().await.unwrap().is_none());
    assert_eq!(registry.latest_files().await.unwrap().current, None);
    assert_eq!(registry.next_version("Chernarus").await.unwrap(), 1);

    // The reserved version is reused by the next successful export
    let outcome = harness
        .registry
        .export(ExportRequest::new("Chernarus"))
        .await
        .unwrap();
    assert_eq!(outcome.version, 1);
}

#[tokio::test]
async fn test_invalid_map_name_is_rejected() {
    let harness = harness().await;
    for name in ["", "../escape", "a/b"] {
        let result = harness.registry.export(ExportRequest::new(name)).await;
        assert!(matches!(result, Err(RegistryError::InvalidMapName(_))), "{name:?}");
    }
}

#[tokio::test]
async fn test_too_large_upload_leaves_overlays_empty() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(
        FileSystemStorage::new(StorageLayout::under(dir.path()))
            .await
            .unwrap(),
    );
    let url = format!("sqlite:{}", dir.path().join("limits.db").display());
    let metadata = Arc::new(SqliteStorage::new(&url).await.unwrap());
    let config = RegistryConfig {
        limits: MarkerLimits {
            max_bytes: 128,
            ..MarkerLimits::default()
        },
        ..RegistryConfig::default()
    };
    let registry = MapRegistry::new(storage.clone(), metadata, config);

    let result = registry
        .ingest(Upload {
            original_filename: "big.png".to_string(),
            bytes: vec![0; 129],
            uploader_id: None,
        })
        .await;
    assert!(matches!(result, Err(RegistryError::TooLarge { size: 129, limit: 128 })));
    assert!(storage.list(StorageArea::Overlays).await.unwrap().is_empty());
}
