//! SQLite metadata storage implementation
//!
//! This module provides a SQLite-based implementation of the MetadataStorage trait.
//! It stores marker assets, placements and map layers in a local SQLite database file.

use super::{MetadataStorage, StorageArea, StoredFile};
use crate::{RegistryError, entities::*, error::Result};
use async_trait::async_trait;
use mapforge::PlacementGeometry;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteRow},
};
use std::str::FromStr;
use time::{
    OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::FormatItem,
    macros::format_description,
};

/// Timestamps are stored as fixed-width UTC text so they sort lexicographically
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

const ASSET_COLUMNS: &str = "a.id AS a_id, a.uploader_id AS a_uploader_id, \
    a.original_filename AS a_original_filename, a.storage_area AS a_storage_area, \
    a.file_name AS a_file_name, a.width AS a_width, a.height AS a_height, \
    a.status AS a_status, a.created_at AS a_created_at";

const PLACEMENT_COLUMNS: &str = "p.id, p.asset_id, p.map_id, p.season_id, p.x_norm, \
    p.y_norm, p.scale, p.rotation_deg, p.label, p.description, p.created_by, p.status, \
    p.created_at, p.reviewed_at, p.reviewed_by";

const LAYER_COLUMNS: &str = "id, map_name, season_id, base_image_path, \
    composite_image_path, version, created_at";

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| RegistryError::Time(format!("Failed to format timestamp: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    PrimitiveDateTime::parse(value, TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| RegistryError::Time(format!("Failed to parse timestamp {:?}: {}", value, e)))
}

/// Current time truncated to the stored precision
fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.microsecond() * 1_000).unwrap_or(now)
}

fn asset_from_row(row: &SqliteRow) -> Result<MarkerAsset> {
    let area: String = row.get("a_storage_area");
    let status: String = row.get("a_status");
    let created_at: String = row.get("a_created_at");

    Ok(MarkerAsset {
        id: row.get("a_id"),
        uploader_id: row.get("a_uploader_id"),
        original_filename: row.get("a_original_filename"),
        location: StoredFile::new(StorageArea::from_str(&area)?, row.get::<String, _>("a_file_name")),
        width: row.get::<i64, _>("a_width") as u32,
        height: row.get::<i64, _>("a_height") as u32,
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn placement_from_row(row: &SqliteRow) -> Result<MarkerPlacement> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let reviewed_at = row
        .get::<Option<String>, _>("reviewed_at")
        .map(|value| parse_timestamp(&value))
        .transpose()?;

    Ok(MarkerPlacement {
        id: row.get("id"),
        asset_id: row.get("asset_id"),
        map_id: row.get("map_id"),
        season_id: row.get("season_id"),
        geometry: PlacementGeometry {
            x_norm: row.get("x_norm"),
            y_norm: row.get("y_norm"),
            scale: row.get("scale"),
            rotation_deg: row.get("rotation_deg"),
        },
        label: row.get("label"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
        reviewed_at,
        reviewed_by: row.get("reviewed_by"),
    })
}

fn layer_from_row(row: &SqliteRow) -> Result<MapLayer> {
    let created_at: String = row.get("created_at");
    Ok(MapLayer {
        id: row.get("id"),
        map_name: row.get("map_name"),
        season_id: row.get("season_id"),
        base_image_path: row.get("base_image_path"),
        composite_image_path: row.get("composite_image_path"),
        version: row.get::<i64, _>("version") as u32,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// SQLite-based metadata storage implementation
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance with the given database path
    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_path)
            .map_err(|e| RegistryError::Database(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to connect to SQLite: {}", e)))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create SQLite storage from environment variable
    ///
    /// Expects DATABASE_URL environment variable with SQLite connection string
    /// Example: sqlite:./data/mapforge.db
    pub async fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./data/mapforge.db".to_string());

        Self::new(&database_url).await
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS marker_assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uploader_id INTEGER,
                original_filename TEXT NOT NULL,
                storage_area TEXT NOT NULL,          -- overlays | awaiting
                file_name TEXT NOT NULL,             -- generated, never the upload name
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RegistryError::Database(format!("Failed to create marker_assets table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS marker_placements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id INTEGER NOT NULL REFERENCES marker_assets(id),
                map_id TEXT,
                season_id INTEGER,
                x_norm REAL NOT NULL,
                y_norm REAL NOT NULL,
                scale REAL NOT NULL,
                rotation_deg REAL NOT NULL DEFAULT 0,
                label TEXT,
                description TEXT,
                created_by INTEGER,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by INTEGER
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RegistryError::Database(format!("Failed to create marker_placements table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS map_layers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                map_name TEXT NOT NULL,
                season_id INTEGER,
                base_image_path TEXT NOT NULL,
                composite_image_path TEXT NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to create map_layers table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_placements_map_status ON marker_placements(map_id, status, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to create placement index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_layers_map ON map_layers(map_name, created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to create layer index: {}", e)))?;

        Ok(())
    }

    /// Get the underlying pool (useful for testing)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStorage for SqliteStorage {
    async fn insert_asset(&self, asset: &NewAsset) -> Result<MarkerAsset> {
        let created_at = now();

        let result = sqlx::query(
            r#"
            INSERT INTO marker_assets
            (uploader_id, original_filename, storage_area, file_name, width, height, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(asset.uploader_id)
        .bind(&asset.original_filename)
        .bind(asset.location.area.as_str())
        .bind(&asset.location.name)
        .bind(asset.width as i64)
        .bind(asset.height as i64)
        .bind(AssetStatus::Uploaded.as_str())
        .bind(format_timestamp(created_at)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to insert asset: {}", e)))?;

        Ok(MarkerAsset {
            id: result.last_insert_rowid(),
            uploader_id: asset.uploader_id,
            original_filename: asset.original_filename.clone(),
            location: asset.location.clone(),
            width: asset.width,
            height: asset.height,
            status: AssetStatus::Uploaded,
            created_at,
        })
    }

    async fn get_asset(&self, id: i64) -> Result<Option<MarkerAsset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM marker_assets a WHERE a.id = ?",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to get asset: {}", e)))?;

        row.as_ref().map(asset_from_row).transpose()
    }

    async fn list_assets(&self) -> Result<Vec<MarkerAsset>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM marker_assets a ORDER BY a.created_at, a.id",
            ASSET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to list assets: {}", e)))?;

        rows.iter().map(asset_from_row).collect()
    }

    async fn claim_asset_for_placement(
        &self,
        location: &StoredFile,
        placement: &NewPlacement,
    ) -> Result<MarkerPlacement> {
        let created_at = now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = sqlx::query(
            "UPDATE marker_assets SET storage_area = ?, file_name = ?, status = ? WHERE id = ?",
        )
        .bind(location.area.as_str())
        .bind(&location.name)
        .bind(AssetStatus::Pending.as_str())
        .bind(placement.asset_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to update asset: {}", e)))?;

        if updated.rows_affected() == 0 {
            return Err(RegistryError::UnknownAsset(placement.asset_id));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO marker_placements
            (asset_id, map_id, season_id, x_norm, y_norm, scale, rotation_deg,
             label, description, created_by, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(placement.asset_id)
        .bind(&placement.map_id)
        .bind(placement.season_id)
        .bind(placement.geometry.x_norm)
        .bind(placement.geometry.y_norm)
        .bind(placement.geometry.scale)
        .bind(placement.geometry.rotation_deg)
        .bind(&placement.label)
        .bind(&placement.description)
        .bind(placement.created_by)
        .bind(PlacementStatus::Pending.as_str())
        .bind(format_timestamp(created_at)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to insert placement: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to commit placement: {}", e)))?;

        Ok(MarkerPlacement {
            id: inserted.last_insert_rowid(),
            asset_id: placement.asset_id,
            map_id: placement.map_id.clone(),
            season_id: placement.season_id,
            geometry: placement.geometry,
            label: placement.label.clone(),
            description: placement.description.clone(),
            created_by: placement.created_by,
            status: PlacementStatus::Pending,
            created_at,
            reviewed_at: None,
            reviewed_by: None,
        })
    }

    async fn get_placement(&self, id: i64) -> Result<Option<MarkerPlacement>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM marker_placements p WHERE p.id = ?",
            PLACEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to get placement: {}", e)))?;

        row.as_ref().map(placement_from_row).transpose()
    }

    async fn list_placements(
        &self,
        map_id: Option<&str>,
        status: PlacementStatus,
    ) -> Result<Vec<MarkerPlacement>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM marker_placements p
            WHERE p.status = ? AND (? IS NULL OR p.map_id = ?)
            ORDER BY p.created_at ASC, p.id ASC
        "#,
            PLACEMENT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(map_id)
        .bind(map_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to list placements: {}", e)))?;

        rows.iter().map(placement_from_row).collect()
    }

    async fn update_review(
        &self,
        id: i64,
        status: PlacementStatus,
        geometry: PlacementGeometry,
        reviewer_id: Option<i64>,
        reviewed_at: OffsetDateTime,
    ) -> Result<MarkerPlacement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = sqlx::query(
            r#"
            UPDATE marker_placements
            SET status = ?, x_norm = ?, y_norm = ?, scale = ?, rotation_deg = ?,
                reviewed_at = ?, reviewed_by = ?
            WHERE id = ?
        "#,
        )
        .bind(status.as_str())
        .bind(geometry.x_norm)
        .bind(geometry.y_norm)
        .bind(geometry.scale)
        .bind(geometry.rotation_deg)
        .bind(format_timestamp(reviewed_at)?)
        .bind(reviewer_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to update placement: {}", e)))?;

        if updated.rows_affected() == 0 {
            return Err(RegistryError::PlacementNotFound(id));
        }

        sqlx::query(
            "UPDATE marker_assets SET status = ? WHERE id = (SELECT asset_id FROM marker_placements WHERE id = ?)",
        )
        .bind(AssetStatus::from(status).as_str())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to update asset status: {}", e)))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM marker_placements p WHERE p.id = ?",
            PLACEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to reload placement: {}", e)))?;
        let placement = placement_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to commit review: {}", e)))?;

        Ok(placement)
    }

    async fn approved_for_export(&self, map_name: &str) -> Result<Vec<ApprovedPlacement>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, {} FROM marker_placements p
            JOIN marker_assets a ON a.id = p.asset_id
            WHERE p.status = ? AND p.map_id = ?
            ORDER BY p.created_at ASC, p.id ASC
        "#,
            PLACEMENT_COLUMNS, ASSET_COLUMNS
        ))
        .bind(PlacementStatus::Approved.as_str())
        .bind(map_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RegistryError::Database(format!("Failed to gather approved placements: {}", e))
        })?;

        rows.iter()
            .map(|row| {
                Ok(ApprovedPlacement {
                    placement: placement_from_row(row)?,
                    asset: asset_from_row(row)?,
                })
            })
            .collect()
    }

    async fn insert_layer(&self, layer: &NewLayer) -> Result<MapLayer> {
        let created_at = now();

        let result = sqlx::query(
            r#"
            INSERT INTO map_layers
            (map_name, season_id, base_image_path, composite_image_path, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&layer.map_name)
        .bind(layer.season_id)
        .bind(&layer.base_image_path)
        .bind(&layer.composite_image_path)
        .bind(layer.version as i64)
        .bind(format_timestamp(created_at)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to insert layer: {}", e)))?;

        Ok(MapLayer {
            id: result.last_insert_rowid(),
            map_name: layer.map_name.clone(),
            season_id: layer.season_id,
            base_image_path: layer.base_image_path.clone(),
            composite_image_path: layer.composite_image_path.clone(),
            version: layer.version,
            created_at,
        })
    }

    async fn latest_layer(&self) -> Result<Option<MapLayer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM map_layers ORDER BY created_at DESC, id DESC LIMIT 1",
            LAYER_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to get latest layer: {}", e)))?;

        row.as_ref().map(layer_from_row).transpose()
    }

    async fn layers_for_map(&self, map_name: &str) -> Result<Vec<MapLayer>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM map_layers WHERE map_name = ? ORDER BY created_at DESC, id DESC",
            LAYER_COLUMNS
        ))
        .bind(map_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegistryError::Database(format!("Failed to list layers: {}", e)))?;

        rows.iter().map(layer_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let storage = SqliteStorage::new(&url).await.unwrap();
        (dir, storage)
    }

    fn new_asset(name: &str) -> NewAsset {
        NewAsset {
            uploader_id: Some(7),
            original_filename: "marker.png".to_string(),
            location: StoredFile::new(StorageArea::Overlays, name),
            width: 300,
            height: 200,
        }
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let later = earlier + time::Duration::microseconds(1);
        let (a, b) = (
            format_timestamp(earlier).unwrap(),
            format_timestamp(later).unwrap(),
        );
        assert!(a < b);
        assert_eq!(a, "2023-11-14T22:13:20.000000Z");
        assert_eq!(parse_timestamp(&b).unwrap(), later);
    }

    #[tokio::test]
    async fn test_asset_round_trip() {
        let (_dir, storage) = storage().await;
        let inserted = storage.insert_asset(&new_asset("a.png")).await.unwrap();
        let loaded = storage.get_asset(inserted.id).await.unwrap().unwrap();

        assert_eq!(loaded, inserted);
        assert_eq!(loaded.status, AssetStatus::Uploaded);
        assert!(storage.get_asset(inserted.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_unknown_asset_writes_nothing() {
        let (_dir, storage) = storage().await;
        let placement = NewPlacement::new(42, PlacementGeometry::new(0.5, 0.5, 1.0, 0.0));
        let result = storage
            .claim_asset_for_placement(&StoredFile::new(StorageArea::Awaiting, "x.png"), &placement)
            .await;

        assert!(matches!(result, Err(RegistryError::UnknownAsset(42))));
        let pending = storage
            .list_placements(None, PlacementStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_claim_and_review_update_asset() {
        let (_dir, storage) = storage().await;
        let asset = storage.insert_asset(&new_asset("b.png")).await.unwrap();
        let awaiting = StoredFile::new(StorageArea::Awaiting, "b.png");
        let placement = storage
            .claim_asset_for_placement(
                &awaiting,
                &NewPlacement::new(asset.id, PlacementGeometry::new(0.25, 0.75, 2.0, 15.0))
                    .on_map("Chernarus"),
            )
            .await
            .unwrap();

        let claimed = storage.get_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(claimed.location, awaiting);
        assert_eq!(claimed.status, AssetStatus::Pending);

        let reviewed_at = now();
        let reviewed = storage
            .update_review(
                placement.id,
                PlacementStatus::Approved,
                PlacementGeometry::new(0.3, 0.75, 2.0, 15.0),
                Some(1),
                reviewed_at,
            )
            .await
            .unwrap();
        assert_eq!(reviewed.status, PlacementStatus::Approved);
        assert_eq!(reviewed.reviewed_by, Some(1));
        assert_eq!(reviewed.reviewed_at, Some(reviewed_at));
        assert_eq!(reviewed.geometry.x_norm, 0.3);

        let approved = storage.approved_for_export("Chernarus").await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].asset.id, asset.id);
        assert_eq!(approved[0].asset.status, AssetStatus::Approved);
        assert!(storage.approved_for_export("Livonia").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_unknown_placement() {
        let (_dir, storage) = storage().await;
        let result = storage
            .update_review(
                9,
                PlacementStatus::Rejected,
                PlacementGeometry::new(0.5, 0.5, 1.0, 0.0),
                None,
                now(),
            )
            .await;
        assert!(matches!(result, Err(RegistryError::PlacementNotFound(9))));
    }

    #[tokio::test]
    async fn test_latest_layer_is_newest_not_highest_version() {
        let (_dir, storage) = storage().await;
        let layer = |map: &str, version| NewLayer {
            map_name: map.to_string(),
            season_id: None,
            base_image_path: format!("/maps/template/{}.png", map),
            composite_image_path: format!("/maps/current/{}_v{:03}.png", map, version),
            version,
        };

        storage.insert_layer(&layer("Chernarus", 5)).await.unwrap();
        let newest = storage.insert_layer(&layer("Livonia", 1)).await.unwrap();

        let latest = storage.latest_layer().await.unwrap().unwrap();
        assert_eq!(latest.id, newest.id);
        assert_eq!(latest.map_name, "Livonia");
        assert_eq!(storage.layers_for_map("Chernarus").await.unwrap().len(), 1);
    }
}
