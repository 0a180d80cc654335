//! Map pipeline request and response bodies
//!
//! Clients send camelCase ids (`assetId`, `mapId`, `seasonId`, `mapName`);
//! the snake_case spellings are accepted too. Geometry fields are always
//! snake_case.

use mapforge_registry::{
    ExportOutcome, GeometryAdjustment, MarkerAsset, NewPlacement, PlacementGeometry,
    PlacementStatus,
};
use serde::{Deserialize, Serialize};

/// Response to a marker upload
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetUploadResponse {
    pub id: i64,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

impl AssetUploadResponse {
    pub fn new(asset: &MarkerAsset, url: String) -> Self {
        Self {
            id: asset.id,
            width: asset.width,
            height: asset.height,
            url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePlacementRequest {
    #[serde(rename = "assetId", alias = "asset_id")]
    pub asset_id: i64,
    #[serde(default, rename = "mapId", alias = "map_id")]
    pub map_id: Option<String>,
    #[serde(default, rename = "seasonId", alias = "season_id")]
    pub season_id: Option<i64>,
    pub x_norm: f64,
    pub y_norm: f64,
    pub scale: f64,
    #[serde(default)]
    pub rotation_deg: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreatePlacementRequest {
    pub fn into_new_placement(self, created_by: Option<i64>) -> NewPlacement {
        NewPlacement {
            asset_id: self.asset_id,
            map_id: self.map_id,
            season_id: self.season_id,
            geometry: PlacementGeometry::new(
                self.x_norm,
                self.y_norm,
                self.scale,
                self.rotation_deg.unwrap_or(0.0),
            ),
            label: self.label,
            description: self.description,
            created_by,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlacementCreatedResponse {
    pub id: i64,
    pub status: PlacementStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlacementQuery {
    #[serde(default, rename = "mapId", alias = "map_id")]
    pub map_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: PlacementStatus,
    #[serde(default)]
    pub x_norm: Option<f64>,
    #[serde(default)]
    pub y_norm: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation_deg: Option<f64>,
}

impl ReviewRequest {
    pub fn adjustment(&self) -> GeometryAdjustment {
        GeometryAdjustment {
            x_norm: self.x_norm,
            y_norm: self.y_norm,
            scale: self.scale,
            rotation_deg: self.rotation_deg,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExportMapRequest {
    #[serde(rename = "mapName", alias = "map_name")]
    pub map_name: String,
    #[serde(default, rename = "seasonId", alias = "season_id")]
    pub season_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Id of the recorded layer
    pub id: i64,
    pub version: u32,
    pub path: String,
}

impl From<ExportOutcome> for ExportResponse {
    fn from(outcome: ExportOutcome) -> Self {
        Self {
            id: outcome.layer.id,
            version: outcome.version,
            path: outcome.path,
        }
    }
}
