//! Map pipeline routes: marker uploads, placements, review and export

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::{get, patch, post},
};
use axum_extra::extract::WithRejection;
use mapforge_registry::{
    ExportRequest, LatestFiles, MapLayer, MarkerPlacement, PlacementFilter, PlacementStatus,
    Review, Upload,
};
use tracing::{debug, info};

use crate::{
    AppState,
    error::{ApiError, Result},
    identity::{Actor, Admin, MaybeActor},
    models::{
        AssetUploadResponse, CreatePlacementRequest, ExportMapRequest, ExportResponse,
        OkResponse, PlacementCreatedResponse, PlacementQuery, ReviewRequest,
    },
};

/// Create map routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/marker-assets", post(upload_marker))
        .route(
            "/marker-placements",
            get(list_placements).post(create_placement),
        )
        .route("/marker-placements/pending", get(pending_placements))
        .route("/marker-placements/{id}", patch(review_placement))
        .route("/export", post(export_map))
        .route("/latest", get(latest_layer))
        .route("/assets", get(latest_assets))
        .route("/layers/{map_name}", get(map_layers))
}

/// Upload a marker image (multipart field `file`)
async fn upload_marker(
    State(state): State<AppState>,
    actor: Actor,
    mut multipart: Multipart,
) -> Result<Json<AssetUploadResponse>> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let original_filename = field.file_name().unwrap_or("marker.png").to_string();
        let bytes = field.bytes().await?;
        upload = Some(Upload {
            original_filename,
            bytes: bytes.to_vec(),
            uploader_id: Some(actor.user_id),
        });
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("File missing"))?;
    debug!(
        "Marker upload from user {}: {} ({} bytes)",
        actor.user_id,
        upload.original_filename,
        upload.bytes.len()
    );

    let asset = state.registry.ingest(upload).await?;
    let url = state.registry.asset_url(&asset);
    Ok(Json(AssetUploadResponse::new(&asset, url)))
}

/// Submit a placement for review
async fn create_placement(
    State(state): State<AppState>,
    actor: Actor,
    WithRejection(Json(request), _): WithRejection<Json<CreatePlacementRequest>, ApiError>,
) -> Result<Json<PlacementCreatedResponse>> {
    let placement = state
        .registry
        .submit_placement(request.into_new_placement(Some(actor.user_id)))
        .await?;

    Ok(Json(PlacementCreatedResponse {
        id: placement.id,
        status: placement.status,
    }))
}

/// List placements, approved ones unless another status is asked for
async fn list_placements(
    State(state): State<AppState>,
    actor: MaybeActor,
    WithRejection(Query(query), _): WithRejection<Query<PlacementQuery>, ApiError>,
) -> Result<Json<Vec<MarkerPlacement>>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => PlacementStatus::default(),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Unknown placement status: {}", value)))?,
    };

    if status == PlacementStatus::Pending && !actor.is_admin() {
        return Err(if actor.0.is_some() {
            ApiError::Forbidden
        } else {
            ApiError::Unauthorized
        });
    }

    let filter = PlacementFilter {
        map_id: query.map_id.filter(|map_id| !map_id.is_empty()),
        status: Some(status),
    };
    Ok(Json(state.registry.list_placements(&filter).await?))
}

async fn pending_placements(
    State(state): State<AppState>,
    _admin: Admin,
) -> Result<Json<Vec<MarkerPlacement>>> {
    Ok(Json(state.registry.pending_placements().await?))
}

async fn review_placement(
    State(state): State<AppState>,
    Admin(admin): Admin,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<ReviewRequest>, ApiError>,
) -> Result<Json<OkResponse>> {
    let review = Review {
        status: request.status,
        reviewer_id: Some(admin.user_id),
        adjustment: request.adjustment(),
    };
    state.registry.review_placement(id, review).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Composite the approved placements of a map into its next version
async fn export_map(
    State(state): State<AppState>,
    Admin(admin): Admin,
    WithRejection(Json(request), _): WithRejection<Json<ExportMapRequest>, ApiError>,
) -> Result<Json<ExportResponse>> {
    info!("Export of {} requested by user {}", request.map_name, admin.user_id);

    let outcome = state
        .registry
        .export(ExportRequest {
            map_name: request.map_name,
            season_id: request.season_id,
        })
        .await?;

    Ok(Json(outcome.into()))
}

async fn latest_layer(State(state): State<AppState>) -> Result<Json<Option<MapLayer>>> {
    Ok(Json(state.registry.latest_layer().await?))
}

async fn latest_assets(State(state): State<AppState>) -> Result<Json<LatestFiles>> {
    Ok(Json(state.registry.latest_files().await?))
}

async fn map_layers(
    State(state): State<AppState>,
    WithRejection(Path(map_name), _): WithRejection<Path<String>, ApiError>,
) -> Result<Json<Vec<MapLayer>>> {
    Ok(Json(state.registry.layers_for(&map_name).await?))
}
