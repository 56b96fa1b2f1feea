//! End-to-end terrain run for one project, and single-layer backfills.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use terrain_etl_database::TerrainRepository;
use terrain_etl_geography::RegionResolver;
use terrain_etl_geometry::NormalizedGeometry;
use terrain_etl_terrain_models::{
    ElevationData, LayerName, LayerStatus, ProjectRef, Region, TerrainDocument,
};

use crate::country::CountryRegistry;
use crate::dem::DemProcessor;
use crate::{EtlError, LayerOutcome};

const UNKNOWN_COUNTRY: &str = "(unknown)";

#[derive(Clone)]
pub struct TerrainPipeline {
    repo: TerrainRepository,
    resolver: RegionResolver,
    dem: DemProcessor,
    countries: Arc<CountryRegistry>,
}

impl TerrainPipeline {
    #[must_use]
    pub const fn new(
        repo: TerrainRepository,
        resolver: RegionResolver,
        dem: DemProcessor,
        countries: Arc<CountryRegistry>,
    ) -> Self {
        Self {
            repo,
            resolver,
            dem,
            countries,
        }
    }

    #[must_use]
    pub const fn repository(&self) -> &TerrainRepository {
        &self.repo
    }

    #[must_use]
    pub fn countries(&self) -> &CountryRegistry {
        &self.countries
    }

    /// Runs the DEM and then every layer of the project's country.
    ///
    /// The outcome is recorded as the document's `pipeline` status:
    /// `failed` with the error, or `ok` with a note naming any layer
    /// whose failure was contained.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::InvalidGeometry`], the DEM error,
    /// [`EtlError::UnsupportedRegion`] when no registered country contains
    /// the geometry, or the first error a country layer returns.
    pub async fn run(&self, project: &ProjectRef) -> Result<Vec<LayerOutcome>, EtlError> {
        let project_id = project.project_id.as_str();
        log::info!("Terrain pipeline start for project {project_id}");

        let result = self.run_layers(project).await;
        let status = match &result {
            Ok(outcomes) => {
                let failed: Vec<String> = outcomes
                    .iter()
                    .filter(|outcome| !outcome.is_ok())
                    .map(|outcome| outcome.layer.to_string())
                    .collect();
                let status = LayerStatus::ok(Utc::now());
                if failed.is_empty() {
                    status
                } else {
                    status.with_note(format!("failed layers: {}", failed.join(", ")))
                }
            }
            Err(e) => LayerStatus::failed(e.to_string(), Utc::now()),
        };
        if let Err(e) = self.repo.set_pipeline_status(project_id, &status).await {
            log::error!("Could not record pipeline status for project {project_id}: {e}");
        }

        match &result {
            Ok(outcomes) => log::info!(
                "Terrain pipeline finished for project {project_id} ({} layers)",
                outcomes.len()
            ),
            Err(e) => log::error!("Terrain pipeline failed for project {project_id}: {e}"),
        }
        result
    }

    async fn run_layers(&self, project: &ProjectRef) -> Result<Vec<LayerOutcome>, EtlError> {
        let project_id = project.project_id.as_str();
        let started = Utc::now();

        let geometry = terrain_etl_geometry::normalize(&project.geometry)?;
        self.repo.set_geometry(project_id, &project.geometry).await?;
        let region = self.resolver.resolve_polygons(geometry.polygons()).await;

        self.run_dem(project_id, &geometry, Some(&region)).await?;

        let code = region.country.as_deref().ok_or_else(|| EtlError::UnsupportedRegion {
            code: UNKNOWN_COUNTRY.to_string(),
        })?;
        match self.countries.run_all(code, project).await {
            Ok(outcomes) => Ok(outcomes),
            Err(e) => {
                self.mark_unfinished(project_id, code, started, &e).await;
                Err(e)
            }
        }
    }

    /// Runs the DEM stage, recording a failure on `etl_layers.dem`.
    async fn run_dem(
        &self,
        project_id: &str,
        geometry: &NormalizedGeometry,
        region: Option<&Region>,
    ) -> Result<ElevationData, EtlError> {
        match self.dem.run(project_id, geometry, region).await {
            Ok(elevation) => Ok(elevation),
            Err(e) => {
                let status = LayerStatus::failed(e.to_string(), Utc::now());
                if let Err(db) = self
                    .repo
                    .set_layer_status(project_id, LayerName::Dem, &status)
                    .await
                {
                    log::error!("Could not record DEM failure for project {project_id}: {db}");
                }
                Err(e)
            }
        }
    }

    /// Marks every layer of `code` that this run did not write as failed
    /// with `error`.
    async fn mark_unfinished(
        &self,
        project_id: &str,
        code: &str,
        started: DateTime<Utc>,
        error: &EtlError,
    ) {
        let Ok(layers) = self.countries.layers(code) else {
            return;
        };
        let terrain = match self.repo.get(project_id).await {
            Ok(terrain) => terrain.unwrap_or_default(),
            Err(e) => {
                log::warn!("Could not read terrain for project {project_id}: {e}");
                TerrainDocument::default()
            }
        };

        let status = LayerStatus::failed(error.to_string(), Utc::now());
        for layer in layers {
            let written_this_run = terrain
                .layer_status(layer)
                .is_some_and(|s| s.updated_at >= started);
            if written_this_run {
                continue;
            }
            log::warn!("Marking {layer} failed for project {project_id}");
            if let Err(e) = self.repo.set_layer_status(project_id, layer, &status).await {
                log::error!("Could not mark {layer} failed for project {project_id}: {e}");
            }
        }
    }

    /// Re-runs one layer without touching the others.
    ///
    /// `geometry` defaults to the one stored by the last full run. The
    /// country comes from the stored region, or is resolved again when
    /// none was stored.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::MissingPrerequisite`] when no geometry is known,
    /// [`EtlError::UnsupportedRegion`] or [`EtlError::UnsupportedLayer`]
    /// for an undispatchable request, or the layer's own error.
    pub async fn backfill(
        &self,
        project_id: &str,
        layer: &str,
        geometry: Option<Value>,
    ) -> Result<LayerOutcome, EtlError> {
        let terrain = self.repo.get(project_id).await?.unwrap_or_default();
        let geometry = geometry
            .or_else(|| terrain.geometry.clone())
            .ok_or_else(|| {
                EtlError::missing(format!("no geometry stored for project {project_id}"))
            })?;
        let project = ProjectRef {
            project_id: project_id.to_string(),
            geometry,
        };

        if matches!(LayerName::from_str(layer.trim()), Ok(LayerName::Dem)) {
            let normalized = terrain_etl_geometry::normalize(&project.geometry)?;
            let elevation = self.run_dem(project_id, &normalized, None).await?;
            let (rows, cols) = elevation.heightmap.shape();
            return Ok(LayerOutcome::new(
                LayerName::Dem,
                LayerStatus::ok(elevation.fetched_at),
                rows * cols,
            ));
        }

        let stored = terrain.region.and_then(|region| region.country);
        let country = if let Some(country) = stored {
            country
        } else {
            let normalized = terrain_etl_geometry::normalize(&project.geometry)?;
            self.resolver
                .resolve_polygons(normalized.polygons())
                .await
                .country
                .ok_or_else(|| EtlError::UnsupportedRegion {
                    code: UNKNOWN_COUNTRY.to_string(),
                })?
        };

        log::info!("Backfilling {layer} for project {project_id} ({country})");
        self.countries.run_layer(&country, layer, &project).await
    }
}
