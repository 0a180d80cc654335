//! Export orchestration: turns the approved placements of a map into the
//! next versioned composite

use std::sync::Arc;

use futures_util::future::try_join_all;
use mapforge::{
    CanvasSpec, OverlaySpec, PositionedOverlay, RgbaImage, blank_canvas, composite, decode_png,
    encode_png, prepare_overlay,
};
use tracing::{debug, info, warn};

use crate::entities::{ApprovedPlacement, ExportOutcome, ExportRequest, NewLayer};
use crate::error::{RegistryError, Result};
use crate::ledger::{VersionLedger, output_name, template_name, validate_map_name};
use crate::storage::{AssetStorage, MetadataStorage, StorageArea, StoredFile};

pub struct MapExporter {
    storage: Arc<dyn AssetStorage>,
    metadata: Arc<dyn MetadataStorage>,
    ledger: Arc<VersionLedger>,
    canvas: CanvasSpec,
}

impl MapExporter {
    pub fn new(
        storage: Arc<dyn AssetStorage>,
        metadata: Arc<dyn MetadataStorage>,
        ledger: Arc<VersionLedger>,
        canvas: CanvasSpec,
    ) -> Self {
        Self {
            storage,
            metadata,
            ledger,
            canvas,
        }
    }

    /// Composite every approved placement of a map onto its template and
    /// record the result as a new layer.
    ///
    /// A failure at any step leaves neither an output file nor a layer row.
    pub async fn export(&self, request: ExportRequest) -> Result<ExportOutcome> {
        let map_name = request.map_name.as_str();
        validate_map_name(map_name)?;

        let reservation = self.ledger.reserve(map_name).await?;
        let version = reservation.version();

        let template = StoredFile::new(StorageArea::Templates, template_name(map_name));
        let base = self.load_template(&template).await?;
        let base_size = base.dimensions();

        let approved = self.metadata.approved_for_export(map_name).await?;
        debug!(map_name, version, placements = approved.len(), "Rendering map export");

        let overlays = try_join_all(
            approved
                .into_iter()
                .map(|entry| self.render_placement(entry, base_size)),
        )
        .await?;

        let png = tokio::task::spawn_blocking(move || encode_png(&composite(&base, &overlays)))
            .await??;

        let output = StoredFile::new(StorageArea::Current, output_name(map_name, version));
        if let Err(err) = self.storage.put(output.area, &output.name, png).await {
            self.discard_output(&output).await;
            return Err(err.into());
        }

        let new_layer = NewLayer {
            map_name: map_name.to_string(),
            season_id: request.season_id,
            base_image_path: self.storage.public_path(&template),
            composite_image_path: self.storage.public_path(&output),
            version,
        };
        let layer = match self.ledger.record_layer(&new_layer).await {
            Ok(layer) => layer,
            Err(err) => {
                self.discard_output(&output).await;
                return Err(err);
            }
        };
        reservation.commit();

        info!(map_name, version, layer_id = layer.id, "Exported map layer");
        Ok(ExportOutcome {
            path: layer.composite_image_path.clone(),
            version,
            layer,
        })
    }

    async fn discard_output(&self, output: &StoredFile) {
        if let Err(cleanup) = self.storage.delete(output.area, &output.name).await {
            warn!(file = %output, error = %cleanup, "Failed to remove unrecorded composite");
        }
    }

    /// Decode the map's template, synthesizing and saving a blank one first
    /// when the map has none
    async fn load_template(&self, template: &StoredFile) -> Result<RgbaImage> {
        if self.storage.exists(template.area, &template.name).await? {
            let bytes = self.storage.get(template.area, &template.name).await?;
            return tokio::task::spawn_blocking(move || decode_png(&bytes))
                .await?
                .map_err(|e| RegistryError::Render(format!("template {}: {}", template, e)));
        }

        let canvas = self.canvas;
        let (image, png) = tokio::task::spawn_blocking(move || {
            let image = blank_canvas(&canvas);
            encode_png(&image).map(|png| (image, png))
        })
        .await??;
        self.storage.put(template.area, &template.name, png).await?;

        info!(
            file = %template,
            width = canvas.width,
            height = canvas.height,
            "Created blank map template"
        );
        Ok(image)
    }

    async fn render_placement(
        &self,
        entry: ApprovedPlacement,
        base_size: (u32, u32),
    ) -> Result<PositionedOverlay> {
        let ApprovedPlacement { placement, asset } = entry;
        let placement_id = placement.id;
        let render_error =
            |reason: String| RegistryError::Render(format!("placement {}: {}", placement_id, reason));

        let source = self
            .storage
            .get(asset.location.area, &asset.location.name)
            .await
            .map_err(|e| render_error(e.to_string()))?;

        let geometry = placement.geometry;
        let spec = OverlaySpec {
            width: asset.width,
            height: asset.height,
            scale: geometry.scale,
            rotation_deg: geometry.rotation_deg,
        };

        tokio::task::spawn_blocking(move || {
            prepare_overlay(&source, &spec, base_size, geometry.x_norm, geometry.y_norm)
        })
        .await?
        .map_err(|e| render_error(e.to_string()))
    }
}
