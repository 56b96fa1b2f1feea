//! Soil layer: SSURGO map units rasterized onto the DEM grid.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geo::MultiPolygon;
use serde_json::{Map, Value};
use terrain_etl_database::TerrainRepository;
use terrain_etl_raster as raster;
use terrain_etl_source::{SoilProvider, SoilRecord, retry};
use terrain_etl_terrain_models::{LayerName, LayerStatus, ProjectRef, SoilData, TerrainDocument};

use crate::{EtlError, LayerOutcome};

pub const NO_POLYGONS: &str = "no soil polygons";

/// Map units keyed for rasterization.
#[derive(Debug, Default)]
pub struct SoilUnits {
    /// Every row without its geometry.
    pub map_units: Vec<Map<String, Value>>,
    /// `mukey` → attributes of the last row seen for it.
    pub units: BTreeMap<String, Map<String, Value>>,
    /// Raster id → `mukey`.
    pub index_map: BTreeMap<String, String>,
    /// Repaired polygons with their raster id, in row order.
    pub shapes: Vec<(MultiPolygon<f64>, i32)>,
}

/// Assigns raster ids (from 1, in order of first appearance) to each
/// distinct `mukey` and decodes polygons.
///
/// Rows without `mukey` or WKT, or with unparseable WKT, contribute to
/// `map_units` only. Invalid polygons are repaired.
#[must_use]
pub fn build_units(records: &[SoilRecord]) -> SoilUnits {
    let mut units = SoilUnits::default();
    let mut ids: BTreeMap<String, i32> = BTreeMap::new();
    let mut seen_polygons: BTreeSet<(i32, &str)> = BTreeSet::new();

    for record in records {
        units.map_units.push(record.attributes.clone());

        let (Some(mukey), Some(wkt)) = (record.mukey(), record.wkt.as_deref()) else {
            continue;
        };
        let polygons = match terrain_etl_geometry::parse_wkt_polygons(wkt) {
            Ok(polygons) => terrain_etl_geometry::repair(polygons),
            Err(e) => {
                log::debug!("Skipping soil row for mukey {mukey}: {e}");
                continue;
            }
        };

        let next_id = i32::try_from(ids.len() + 1).unwrap_or(i32::MAX);
        let id = *ids.entry(mukey.clone()).or_insert(next_id);
        units.index_map.insert(id.to_string(), mukey.clone());
        units.units.insert(mukey, record.attributes.clone());

        // Component and horizon rows repeat the map-unit polygon.
        if seen_polygons.insert((id, wkt)) {
            units.shapes.push((polygons, id));
        }
    }

    units
}

/// Fetches soil map units for a project and stores them with a grid
/// aligned to the DEM.
#[derive(Clone)]
pub struct SoilEtl {
    repo: TerrainRepository,
    provider: Arc<dyn SoilProvider>,
    attempts: u32,
    backoff: Duration,
}

impl SoilEtl {
    /// Two attempts, one second apart.
    #[must_use]
    pub fn new(repo: TerrainRepository, provider: Arc<dyn SoilProvider>) -> Self {
        Self {
            repo,
            provider,
            attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts;
        self.backoff = backoff;
        self
    }

    /// Runs the soil layer.
    ///
    /// Provider, empty-result and rasterization failures are recorded on
    /// `etl_layers.soil` and returned as a failed outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::InvalidGeometry`] for an unusable geometry,
    /// [`EtlError::MissingPrerequisite`] if no DEM is stored, or
    /// [`EtlError::Database`] if reading or writing the terrain fails.
    pub async fn run(&self, project: &ProjectRef) -> Result<LayerOutcome, EtlError> {
        let project_id = project.project_id.as_str();
        let geometry = terrain_etl_geometry::normalize(&project.geometry)?;

        let terrain = self.repo.get(project_id).await?;
        let Some(elevation) = terrain.as_ref().and_then(TerrainDocument::usable_elevation) else {
            return Err(EtlError::missing("DEM must be loaded before soil ETL"));
        };
        let (rows, cols) = elevation.heightmap.shape();
        let transform = elevation.transform;
        let bounds = elevation.bounds;

        log::info!("Soil ETL fetching for project {project_id}");
        let wkt = geometry.to_wkt();
        let label = format!("Soil ETL for project {project_id}");
        let records = match retry::with_retry(self.attempts, self.backoff, &label, || {
            self.provider.query(&wkt)
        })
        .await
        {
            Ok(records) => records,
            Err(e) => {
                let status = LayerStatus::failed(e.to_string(), Utc::now());
                self.repo
                    .set_layer_status(project_id, LayerName::Soil, &status)
                    .await?;
                return Ok(LayerOutcome::new(LayerName::Soil, status, 0));
            }
        };
        log::info!("Soil ETL fetched {} rows for project {project_id}", records.len());

        let count = records.len();
        let SoilUnits {
            map_units,
            units,
            index_map,
            shapes,
        } = build_units(&records);

        let (grid, status) = if shapes.is_empty() {
            log::warn!("Soil ETL found no polygons to rasterize for project {project_id}");
            (None, LayerStatus::failed(NO_POLYGONS, Utc::now()))
        } else {
            let rasterized = tokio::task::spawn_blocking(move || {
                raster::rasterize(&shapes, rows, cols, &transform, 0)
            })
            .await
            .map_err(|e| e.to_string())
            .and_then(|result| result.map_err(|e| e.to_string()));

            match rasterized {
                Ok(grid) => (Some(grid), LayerStatus::ok(Utc::now())),
                Err(message) => {
                    let e = EtlError::RasterizationFailure { message };
                    log::error!("Soil rasterize failed for project {project_id}: {e}");
                    let status = LayerStatus::failed(e.to_string(), Utc::now());
                    self.repo
                        .set_layer_status(project_id, LayerName::Soil, &status)
                        .await?;
                    return Ok(LayerOutcome::new(LayerName::Soil, status, count));
                }
            }
        };

        let soil = SoilData {
            source: self.provider.source().to_string(),
            map_units,
            units,
            index_map,
            grid,
            bounds: Some(bounds),
            transform: Some(transform),
            fetched_at: Utc::now(),
        };
        self.repo
            .save_layer(project_id, LayerName::Soil, Some(&soil), &status)
            .await?;
        log::info!("Soil ETL stored for project {project_id} ({})", status.status);

        Ok(LayerOutcome::new(LayerName::Soil, status, count))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use terrain_etl_database::{DocumentStore, MemoryStore};
    use terrain_etl_source::SourceError;
    use terrain_etl_source::cache::DiskCache;
    use terrain_etl_terrain_models::LayerState;

    use super::*;
    use crate::dem::DemProcessor;
    use crate::dem::tests::{FixedDem, project_polygon, temp_cache, tiff};

    /// Fails the first `failures` queries, then returns `records`.
    pub(crate) struct FlakySoil {
        pub(crate) records: Vec<SoilRecord>,
        pub(crate) failures: u32,
        pub(crate) calls: AtomicU32,
    }

    impl FlakySoil {
        pub(crate) fn new(records: Vec<SoilRecord>, failures: u32) -> Self {
            Self {
                records,
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SoilProvider for FlakySoil {
        fn source(&self) -> &str {
            "USDA_SSURGO"
        }

        async fn query(&self, _aoi_wkt: &str) -> Result<Vec<SoilRecord>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SourceError::Response {
                    message: "HTTP 500".to_string(),
                });
            }
            Ok(self.records.clone())
        }
    }

    pub(crate) fn record(mukey: &str, wkt: Option<&str>) -> SoilRecord {
        let mut attributes = Map::new();
        attributes.insert("mukey".to_string(), json!(mukey));
        attributes.insert("muname".to_string(), json!(format!("unit {mukey}")));
        SoilRecord {
            attributes,
            wkt: wkt.map(str::to_string),
        }
    }

    /// Two map units splitting the project polygon down the middle.
    pub(crate) fn two_units() -> Vec<SoilRecord> {
        vec![
            record(
                "100",
                Some("POLYGON ((-93.9 41.7, -93.8 41.7, -93.8 41.9, -93.9 41.9, -93.9 41.7))"),
            ),
            record(
                "100",
                Some("POLYGON ((-93.9 41.7, -93.8 41.7, -93.8 41.9, -93.9 41.9, -93.9 41.7))"),
            ),
            record(
                "200",
                Some("POLYGON ((-93.8 41.7, -93.7 41.7, -93.7 41.9, -93.8 41.9, -93.8 41.7))"),
            ),
            record("", Some("POLYGON ((0 0, 1 0, 1 1, 0 0))")),
            record("300", None),
            record("400", Some("not wkt")),
        ]
    }

    pub(crate) async fn repo_with_dem(name: &str) -> (TerrainRepository, DiskCache) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = TerrainRepository::new(store);
        let cache = temp_cache(name);
        let dem = DemProcessor::new(
            repo.clone(),
            Arc::new(FixedDem::new(tiff(40, 40, -94.0, 42.0))),
            cache.clone(),
        );
        let geometry = terrain_etl_geometry::normalize(&project_polygon()).unwrap();
        dem.run("p1", &geometry, None).await.unwrap();
        (repo, cache)
    }

    pub(crate) fn project() -> ProjectRef {
        ProjectRef {
            project_id: "p1".to_string(),
            geometry: project_polygon(),
        }
    }

    #[test]
    fn ids_follow_first_appearance_and_skip_bad_rows() {
        let units = build_units(&two_units());

        assert_eq!(units.map_units.len(), 6);
        assert_eq!(units.index_map.len(), 2);
        assert_eq!(units.index_map["1"], "100");
        assert_eq!(units.index_map["2"], "200");
        assert_eq!(units.shapes.len(), 2);
        assert!(units.units.contains_key("100"));
        assert!(!units.units.contains_key("300"));
        assert!(!units.units.contains_key("400"));
    }

    #[tokio::test]
    async fn requires_dem() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let provider = Arc::new(FlakySoil::new(two_units(), 0));
        let etl = SoilEtl::new(TerrainRepository::new(store), provider.clone());

        let err = etl.run(&project()).await.unwrap_err();
        assert!(matches!(err, EtlError::MissingPrerequisite { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_once_then_stores_aligned_grid() {
        let (repo, cache) = repo_with_dem("soil_retry").await;
        let provider = Arc::new(FlakySoil::new(two_units(), 1));
        let etl = SoilEtl::new(repo.clone(), provider.clone()).with_retry(2, Duration::ZERO);

        let outcome = etl.run(&project()).await.unwrap();

        assert!(outcome.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let doc = repo.get("p1").await.unwrap().unwrap();
        let elevation = doc.elevation_data.unwrap();
        let soil = doc.soil_data.unwrap();
        let grid = soil.grid.unwrap();
        assert_eq!(grid.shape(), elevation.heightmap.shape());
        assert_eq!(soil.transform, Some(elevation.transform));
        assert!(grid.cells().contains(&1));
        assert!(grid.cells().contains(&2));
        assert_eq!(soil.source, "USDA_SSURGO");
        assert_eq!(doc.etl_layers["soil"].status, LayerState::Ok);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn persistent_provider_failure_is_recorded_not_raised() {
        let (repo, cache) = repo_with_dem("soil_down").await;
        let provider = Arc::new(FlakySoil::new(two_units(), u32::MAX));
        let etl = SoilEtl::new(repo.clone(), provider.clone()).with_retry(2, Duration::ZERO);

        let outcome = etl.run(&project()).await.unwrap();

        assert!(!outcome.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        let doc = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(doc.etl_layers["soil"].status, LayerState::Failed);
        assert!(doc.etl_layers["soil"].error.as_deref().unwrap().contains("HTTP 500"));
        assert!(doc.soil_data.is_none());

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn no_polygons_stores_units_without_grid() {
        let (repo, cache) = repo_with_dem("soil_empty").await;
        let provider = Arc::new(FlakySoil::new(vec![record("300", None)], 0));
        let etl = SoilEtl::new(repo.clone(), provider);

        let outcome = etl.run(&project()).await.unwrap();

        assert_eq!(outcome.status.error.as_deref(), Some(NO_POLYGONS));
        let doc = repo.get("p1").await.unwrap().unwrap();
        let soil = doc.soil_data.unwrap();
        assert!(soil.grid.is_none());
        assert_eq!(soil.map_units.len(), 1);
        assert_eq!(doc.etl_layers["soil"].status, LayerState::Failed);

        let _ = std::fs::remove_dir_all(cache.dir());
    }
}
