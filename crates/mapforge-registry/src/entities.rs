//! Core data structures for the mapforge registry

use mapforge::{GeometryAdjustment, PlacementGeometry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::RegistryError;
use crate::storage::StoredFile;

/// Lifecycle of an uploaded marker image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Uploaded,
    Pending,
    Approved,
    Rejected,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Uploaded => "uploaded",
            AssetStatus::Pending => "pending",
            AssetStatus::Approved => "approved",
            AssetStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(AssetStatus::Uploaded),
            "pending" => Ok(AssetStatus::Pending),
            "approved" => Ok(AssetStatus::Approved),
            "rejected" => Ok(AssetStatus::Rejected),
            other => Err(RegistryError::Database(format!("Unknown asset status: {}", other))),
        }
    }
}

/// Approval state of a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStatus {
    Pending,
    Approved,
    Rejected,
}

impl PlacementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStatus::Pending => "pending",
            PlacementStatus::Approved => "approved",
            PlacementStatus::Rejected => "rejected",
        }
    }
}

impl Default for PlacementStatus {
    /// Listings show approved placements unless asked otherwise
    fn default() -> Self {
        PlacementStatus::Approved
    }
}

impl fmt::Display for PlacementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlacementStatus::Pending),
            "approved" => Ok(PlacementStatus::Approved),
            "rejected" => Ok(PlacementStatus::Rejected),
            other => Err(RegistryError::Database(format!(
                "Unknown placement status: {}",
                other
            ))),
        }
    }
}

impl From<PlacementStatus> for AssetStatus {
    fn from(status: PlacementStatus) -> Self {
        match status {
            PlacementStatus::Pending => AssetStatus::Pending,
            PlacementStatus::Approved => AssetStatus::Approved,
            PlacementStatus::Rejected => AssetStatus::Rejected,
        }
    }
}

/// A stored, normalized marker image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerAsset {
    pub id: i64,
    pub uploader_id: Option<i64>,
    pub original_filename: String,
    /// Where the file lives now; changes when a placement claims it
    pub location: StoredFile,
    pub width: u32,
    pub height: u32,
    pub status: AssetStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A request to put an asset on a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerPlacement {
    pub id: i64,
    pub asset_id: i64,
    pub map_id: Option<String>,
    pub season_id: Option<i64>,
    #[serde(flatten)]
    pub geometry: PlacementGeometry,
    pub label: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub status: PlacementStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    pub reviewed_by: Option<i64>,
}

/// A recorded export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: i64,
    pub map_name: String,
    pub season_id: Option<i64>,
    /// Web-rooted path of the template the composite was built on
    pub base_image_path: String,
    /// Web-rooted path of the composite
    pub composite_image_path: String,
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Raw upload handed to the asset store
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_filename: String,
    pub bytes: Vec<u8>,
    pub uploader_id: Option<i64>,
}

/// Asset row to insert
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub uploader_id: Option<i64>,
    pub original_filename: String,
    pub location: StoredFile,
    pub width: u32,
    pub height: u32,
}

/// Placement submission
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlacement {
    pub asset_id: i64,
    pub map_id: Option<String>,
    pub season_id: Option<i64>,
    pub geometry: PlacementGeometry,
    pub label: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
}

impl NewPlacement {
    pub fn new(asset_id: i64, geometry: PlacementGeometry) -> Self {
        Self {
            asset_id,
            map_id: None,
            season_id: None,
            geometry,
            label: None,
            description: None,
            created_by: None,
        }
    }

    pub fn on_map(mut self, map_id: impl Into<String>) -> Self {
        self.map_id = Some(map_id.into());
        self
    }
}

/// A reviewer's decision on a placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Review {
    pub status: PlacementStatus,
    pub reviewer_id: Option<i64>,
    pub adjustment: GeometryAdjustment,
}

impl Review {
    pub fn new(status: PlacementStatus, reviewer_id: Option<i64>) -> Self {
        Self {
            status,
            reviewer_id,
            adjustment: GeometryAdjustment::default(),
        }
    }

    pub fn approve(reviewer_id: Option<i64>) -> Self {
        Self::new(PlacementStatus::Approved, reviewer_id)
    }

    pub fn reject(reviewer_id: Option<i64>) -> Self {
        Self::new(PlacementStatus::Rejected, reviewer_id)
    }
}

/// Filter for placement listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementFilter {
    pub map_id: Option<String>,
    /// Defaults to approved
    pub status: Option<PlacementStatus>,
}

/// An approved placement joined with the asset it renders
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedPlacement {
    pub placement: MarkerPlacement,
    pub asset: MarkerAsset,
}

/// Layer row to insert
#[derive(Debug, Clone)]
pub struct NewLayer {
    pub map_name: String,
    pub season_id: Option<i64>,
    pub base_image_path: String,
    pub composite_image_path: String,
    pub version: u32,
}

/// Export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub map_name: String,
    pub season_id: Option<i64>,
}

impl ExportRequest {
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            season_id: None,
        }
    }
}

/// Result of a successful export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOutcome {
    pub layer: MapLayer,
    pub version: u32,
    /// Web-rooted path of the written composite
    pub path: String,
}

/// Most recent template and composite files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatestFiles {
    pub template: Option<String>,
    pub current: Option<String>,
}

/// Outcome of the startup consistency pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Files moved back to their recorded location
    pub restored: usize,
    /// Assets whose file could not be found anywhere
    pub orphaned: usize,
}
