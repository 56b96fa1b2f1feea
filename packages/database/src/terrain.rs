//! Typed access to the `terrain` collection.
//!
//! Layers are written with dotted-path partial updates so that a layer
//! ETL never overwrites fields owned by another layer.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use terrain_etl_terrain_models::{ElevationData, LayerName, LayerStatus, Region, TerrainDocument};

use crate::{DbError, DocumentStore, Filter, Update, collections};

/// Reads and writes [`TerrainDocument`]s keyed by project id.
#[derive(Clone)]
pub struct TerrainRepository {
    store: Arc<dyn DocumentStore>,
}

impl TerrainRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn by_project(project_id: &str) -> Filter {
        Filter::eq("project_id", project_id)
    }

    /// Loads the terrain document for a project.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or the stored document does
    /// not deserialize.
    pub async fn get(&self, project_id: &str) -> Result<Option<TerrainDocument>, DbError> {
        self.store
            .find_one(collections::TERRAIN, &Self::by_project(project_id))
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(DbError::from)
    }

    /// Upserts the elevation layer, the resolved region and
    /// `etl_layers.dem`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the update fails.
    pub async fn save_elevation(
        &self,
        project_id: &str,
        elevation: &ElevationData,
        region: Option<&Region>,
        status: &LayerStatus,
    ) -> Result<(), DbError> {
        let mut update = Update::new()
            .set("project_id", project_id)
            .set(LayerName::Dem.data_field(), serde_json::to_value(elevation)?)
            .set(layer_path(LayerName::Dem), serde_json::to_value(status)?);
        if let Some(region) = region {
            update = update.set("region", serde_json::to_value(region)?);
        }

        self.store
            .update_one(collections::TERRAIN, &Self::by_project(project_id), &update, true)
            .await?;
        log::info!("Stored elevation data for project {project_id}");
        Ok(())
    }

    /// Writes a layer's data (when given) together with its status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the update fails.
    pub async fn save_layer<T: Serialize + Sync>(
        &self,
        project_id: &str,
        layer: LayerName,
        data: Option<&T>,
        status: &LayerStatus,
    ) -> Result<(), DbError> {
        let mut update = Update::new().set("project_id", project_id);
        if let Some(data) = data {
            update = update.set(layer.data_field(), serde_json::to_value(data)?);
        }
        update = update.set(layer_path(layer), serde_json::to_value(status)?);

        self.store
            .update_one(collections::TERRAIN, &Self::by_project(project_id), &update, true)
            .await?;
        log::debug!("Updated {layer} for project {project_id} ({})", status.status);
        Ok(())
    }

    /// Writes only `etl_layers.<layer>`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the update fails.
    pub async fn set_layer_status(
        &self,
        project_id: &str,
        layer: LayerName,
        status: &LayerStatus,
    ) -> Result<(), DbError> {
        self.save_layer::<Value>(project_id, layer, None, status).await
    }

    /// Remembers the boundary a project was run with, so a later backfill
    /// does not need it again.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    pub async fn set_geometry(&self, project_id: &str, geometry: &Value) -> Result<(), DbError> {
        let update = Update::new()
            .set("project_id", project_id)
            .set("geometry", geometry.clone());
        self.store
            .update_one(collections::TERRAIN, &Self::by_project(project_id), &update, true)
            .await?;
        Ok(())
    }

    /// Records the outcome of a full pipeline run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the update fails.
    pub async fn set_pipeline_status(
        &self,
        project_id: &str,
        status: &LayerStatus,
    ) -> Result<(), DbError> {
        let update = Update::new()
            .set("project_id", project_id)
            .set("pipeline", serde_json::to_value(status)?);
        self.store
            .update_one(collections::TERRAIN, &Self::by_project(project_id), &update, true)
            .await?;
        Ok(())
    }

    /// Deletes a project's terrain. Called when the project is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub async fn delete(&self, project_id: &str) -> Result<u64, DbError> {
        let removed = self
            .store
            .delete_many(collections::TERRAIN, &Self::by_project(project_id))
            .await?;
        log::info!("Deleted {removed} terrain document(s) for project {project_id}");
        Ok(removed)
    }
}

fn layer_path(layer: LayerName) -> String {
    format!("etl_layers.{}", layer.key())
}
