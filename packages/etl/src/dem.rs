//! Elevation acquisition and processing.
//!
//! A run moves through `fetching → processing → storing → stored`. Any
//! error stops the run and nothing is written; recording the failure is
//! the caller's job (see [`crate::pipeline`]).

use std::sync::Arc;

use chrono::Utc;
use geo::Rect;
use strum::Display;
use terrain_etl_database::TerrainRepository;
use terrain_etl_geometry::{BoundingBox, BufferPolicy, NormalizedGeometry};
use terrain_etl_raster as raster;
use terrain_etl_source::ElevationProvider;
use terrain_etl_source::cache::DiskCache;
use terrain_etl_terrain_models::{
    ElevationData, GeoTransform, Grid, GridBounds, LayerStatus, Region,
};

use crate::EtlError;

/// Cells of margin kept around the polygon when cropping.
const CROP_BUFFER_CELLS: f64 = 2.0;

/// Per-project DEM lifecycle: `none → fetching → processed → stored`,
/// or `failed` from any earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DemState {
    None,
    Fetching,
    Processed,
    Stored,
    Failed,
}

impl DemState {
    /// The state reached by a successful step, `None` once terminal.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Fetching),
            Self::Fetching => Some(Self::Processed),
            Self::Processed => Some(Self::Stored),
            Self::Stored | Self::Failed => None,
        }
    }

    fn advance(&mut self, project_id: &str) {
        if let Some(next) = self.next() {
            log::info!("DEM {self} -> {next} for project {project_id}");
            *self = next;
        }
    }
}

/// A processed heightmap ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDem {
    pub heightmap: Grid<f64>,
    pub transform: GeoTransform,
    pub bounds: GridBounds,
    pub min_elevation: f64,
    pub max_elevation: f64,
}

/// Decodes a `GeoTIFF` and aligns it: no-data → 0, symmetric zero padding
/// to a square, then (when `crop_to` is given) a crop to those bounds plus
/// a two-cell margin.
///
/// A crop that cannot be computed keeps the padded grid.
///
/// # Errors
///
/// Returns [`EtlError::Raster`] if the payload cannot be decoded or has
/// no cells.
pub fn process_dem(bytes: &[u8], crop_to: Option<Rect<f64>>) -> Result<ProcessedDem, EtlError> {
    let decoded = raster::decode(bytes)?;
    if decoded.grid.is_empty() {
        return Err(raster::RasterError::EmptyGrid.into());
    }

    let cleaned = raster::replace_nodata(&decoded.grid, decoded.nodata);
    let (mut heightmap, mut transform) = raster::pad_to_square(&cleaned, &decoded.transform);
    log::debug!(
        "DEM decoded {}x{}, padded to {}x{}",
        decoded.grid.rows(),
        decoded.grid.cols(),
        heightmap.rows(),
        heightmap.cols()
    );

    if let Some(bounds) = crop_to {
        match raster::crop_to_bounds(&heightmap, &transform, bounds, CROP_BUFFER_CELLS) {
            Ok((cropped, cropped_transform)) => {
                log::info!(
                    "DEM cropped to polygon bbox + buffer: rows={} cols={}",
                    cropped.rows(),
                    cropped.cols()
                );
                heightmap = cropped;
                transform = cropped_transform;
            }
            Err(e) => log::warn!("DEM crop to polygon bbox failed; keeping padded grid: {e}"),
        }
    }

    let (min_elevation, max_elevation) = raster::min_max(&heightmap).unwrap_or((0.0, 0.0));
    let bounds = GridBounds::from_transform(heightmap.rows(), heightmap.cols(), &transform);
    log::info!("DEM processed (min={min_elevation:.2}, max={max_elevation:.2})");

    Ok(ProcessedDem {
        heightmap,
        transform,
        bounds,
        min_elevation,
        max_elevation,
    })
}

/// Cache file name for a DEM request.
#[must_use]
pub fn cache_file_name(bbox: &BoundingBox) -> String {
    format!("dem_{}.tif", bbox.cache_key())
}

/// Fetches, processes and stores the elevation layer of a project.
#[derive(Clone)]
pub struct DemProcessor {
    repo: TerrainRepository,
    provider: Arc<dyn ElevationProvider>,
    cache: DiskCache,
    policy: BufferPolicy,
    crop: bool,
}

impl DemProcessor {
    #[must_use]
    pub fn new(
        repo: TerrainRepository,
        provider: Arc<dyn ElevationProvider>,
        cache: DiskCache,
    ) -> Self {
        Self {
            repo,
            provider,
            cache,
            policy: BufferPolicy::default(),
            crop: true,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_crop(mut self, crop: bool) -> Self {
        self.crop = crop;
        self
    }

    /// Runs the DEM stage for a project and stores the result together
    /// with `region`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError`] if the geometry has no bounds, the fetch,
    /// processing or store fails.
    pub async fn run(
        &self,
        project_id: &str,
        geometry: &NormalizedGeometry,
        region: Option<&Region>,
    ) -> Result<ElevationData, EtlError> {
        let mut state = DemState::None;
        match self.run_stages(project_id, geometry, region, &mut state).await {
            Ok(elevation) => Ok(elevation),
            Err(e) => {
                log::error!("DEM {state} -> {} for project {project_id}: {e}", DemState::Failed);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        project_id: &str,
        geometry: &NormalizedGeometry,
        region: Option<&Region>,
        state: &mut DemState,
    ) -> Result<ElevationData, EtlError> {
        let bounds = geometry
            .bounds()
            .ok_or_else(|| EtlError::missing("geometry has no bounds"))?;
        let bbox = BoundingBox::square_around(bounds, self.policy);

        state.advance(project_id);
        let bytes = self.fetch(project_id, &bbox).await?;

        let crop_to = self.crop.then_some(bounds);
        let processed = tokio::task::spawn_blocking(move || process_dem(&bytes, crop_to))
            .await
            .map_err(|e| raster::RasterError::Shape {
                message: format!("DEM processing task failed: {e}"),
            })??;
        state.advance(project_id);

        let elevation = ElevationData {
            heightmap: processed.heightmap,
            min_elevation: processed.min_elevation,
            max_elevation: processed.max_elevation,
            bounds: processed.bounds,
            transform: processed.transform,
            resolution: self.provider.resolution().to_string(),
            source: self.provider.source().to_string(),
            fetched_at: Utc::now(),
        };

        self.repo
            .save_elevation(project_id, &elevation, region, &LayerStatus::ok(Utc::now()))
            .await?;
        state.advance(project_id);

        Ok(elevation)
    }

    async fn fetch(&self, project_id: &str, bbox: &BoundingBox) -> Result<Vec<u8>, EtlError> {
        let name = cache_file_name(bbox);
        if let Some(bytes) = self.cache.get(&name).await? {
            log::info!("DEM cache hit for project {project_id} -> {name}");
            return Ok(bytes);
        }

        log::info!("DEM fetch start for project {project_id}");
        let bytes = self.provider.fetch(bbox).await?;
        if let Err(e) = self.cache.put(&name, &bytes).await {
            log::warn!("Could not cache DEM {name}: {e}");
        }
        log::info!("DEM fetched for project {project_id}, saved {name}");
        Ok(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use geo::coord;
    use serde_json::json;
    use terrain_etl_database::{DocumentStore, MemoryStore};
    use terrain_etl_source::SourceError;
    use terrain_etl_terrain_models::LayerState;

    use super::*;

    /// Serves a fixed `GeoTIFF` and counts calls.
    pub(crate) struct FixedDem {
        pub(crate) tiff: Vec<u8>,
        pub(crate) calls: AtomicU32,
    }

    impl FixedDem {
        pub(crate) fn new(tiff: Vec<u8>) -> Self {
            Self {
                tiff,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ElevationProvider for FixedDem {
        fn source(&self) -> &str {
            "fixed"
        }

        fn resolution(&self) -> &str {
            "90m"
        }

        async fn fetch(&self, _bbox: &BoundingBox) -> Result<Vec<u8>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tiff.clone())
        }
    }

    pub(crate) struct DownDem;

    #[async_trait]
    impl ElevationProvider for DownDem {
        fn source(&self) -> &str {
            "down"
        }

        fn resolution(&self) -> &str {
            "90m"
        }

        async fn fetch(&self, _bbox: &BoundingBox) -> Result<Vec<u8>, SourceError> {
            Err(SourceError::Response {
                message: "HTTP 503".to_string(),
            })
        }
    }

    /// A `rows × cols` `GeoTIFF` of 0.01° cells with its top-left corner at
    /// `(west, north)`; cell value is `row * 100 + col`.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn tiff(rows: usize, cols: usize, west: f64, north: f64) -> Vec<u8> {
        let cells = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r * 100 + c) as f64))
            .collect();
        let grid = Grid::from_cells(rows, cols, cells).unwrap();
        let transform = GeoTransform::from_origin(west, north, 0.01, 0.01);
        raster::encode(&grid, &transform, Some(-9999.0)).unwrap()
    }

    pub(crate) fn temp_cache(name: &str) -> DiskCache {
        let dir = std::env::temp_dir().join(format!(
            "terrain_etl_dem_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        DiskCache::new(dir)
    }

    /// A 0.1° square whose bounds sit well inside a 40×40 grid at (-94, 42).
    pub(crate) fn project_polygon() -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [-93.85, 41.85], [-93.75, 41.85], [-93.75, 41.75], [-93.85, 41.75], [-93.85, 41.85]
            ]]
        })
    }

    #[test]
    fn pads_non_square_grid_symmetrically() {
        let bytes = tiff(2, 4, -94.0, 42.0);
        let processed = process_dem(&bytes, None).unwrap();

        assert_eq!(processed.heightmap.shape(), (4, 4));
        assert!(processed.heightmap.row(0).iter().all(|&v| v == 0.0));
        assert_eq!(processed.heightmap.row(1), &[0.0, 1.0, 2.0, 3.0]);
        assert!((processed.transform.f - 42.01).abs() < 1e-9);
        assert!((processed.bounds.top - 42.01).abs() < 1e-9);
        assert!((processed.bounds.bottom - 41.97).abs() < 1e-9);
        assert_eq!(processed.min_elevation, 0.0);
        assert_eq!(processed.max_elevation, 103.0);
    }

    #[test]
    fn crops_to_bounds_plus_two_cells() {
        let bytes = tiff(40, 40, -94.0, 42.0);
        let bounds = Rect::new(coord! { x: -93.85, y: 41.75 }, coord! { x: -93.75, y: 41.85 });
        let processed = process_dem(&bytes, Some(bounds)).unwrap();

        let cell = 0.01;
        assert!((processed.bounds.left - (-93.85 - 2.0 * cell)).abs() <= cell + 1e-9);
        assert!((processed.bounds.right - (-93.75 + 2.0 * cell)).abs() <= cell + 1e-9);
        assert!((processed.bounds.top - (41.85 + 2.0 * cell)).abs() <= cell + 1e-9);
        assert!((processed.bounds.bottom - (41.75 - 2.0 * cell)).abs() <= cell + 1e-9);
        assert!(processed.heightmap.rows() >= 14 && processed.heightmap.rows() <= 16);
    }

    #[test]
    fn crop_outside_grid_keeps_padded_grid() {
        let bytes = tiff(10, 10, -94.0, 42.0);
        let far = Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 11.0, y: 11.0 });
        let processed = process_dem(&bytes, Some(far)).unwrap();
        assert_eq!(processed.heightmap.shape(), (10, 10));
    }

    #[test]
    fn nodata_becomes_zero() {
        let grid = Grid::from_cells(2, 2, vec![-9999.0, 5.0, 6.0, 7.0]).unwrap();
        let transform = GeoTransform::from_origin(0.0, 1.0, 0.5, 0.5);
        let bytes = raster::encode(&grid, &transform, Some(-9999.0)).unwrap();

        let processed = process_dem(&bytes, None).unwrap();
        assert_eq!(processed.heightmap.cells(), &[0.0, 5.0, 6.0, 7.0]);
        assert_eq!(processed.min_elevation, 0.0);
    }

    #[test]
    fn lifecycle_runs_none_to_stored() {
        let mut states = vec![DemState::None];
        while let Some(next) = states.last().and_then(|s| s.next()) {
            states.push(next);
        }
        let names: Vec<String> = states.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["none", "fetching", "processed", "stored"]);
        assert_eq!(DemState::Failed.next(), None);
        assert_eq!(DemState::Failed.to_string(), "failed");
    }

    #[test]
    fn cache_name_uses_bbox_key() {
        let bbox = BoundingBox::new(-93.12346, 42.0, -92.5, 42.625);
        assert_eq!(cache_file_name(&bbox), "dem_m93_1235_42_0000_m92_5000_42_6250.tif");
    }

    #[tokio::test]
    async fn stores_dem_and_reuses_cache() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = TerrainRepository::new(store);
        let provider = Arc::new(FixedDem::new(tiff(40, 40, -94.0, 42.0)));
        let cache = temp_cache("stores");
        let processor = DemProcessor::new(repo.clone(), provider.clone(), cache.clone());
        let geometry = terrain_etl_geometry::normalize(&project_polygon()).unwrap();
        let region = Region {
            country: Some("USA".to_string()),
            ..Region::default()
        };

        let first = processor.run("p1", &geometry, Some(&region)).await.unwrap();
        let second = processor.run("p1", &geometry, None).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.heightmap, second.heightmap);

        let doc = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(doc.region.unwrap().country.as_deref(), Some("USA"));
        assert_eq!(doc.elevation_data.unwrap().resolution, "90m");
        assert_eq!(doc.etl_layers["dem"].status, LayerState::Ok);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn fetch_failure_writes_nothing() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = TerrainRepository::new(store);
        let processor = DemProcessor::new(repo.clone(), Arc::new(DownDem), temp_cache("down"));
        let geometry = terrain_etl_geometry::normalize(&project_polygon()).unwrap();

        let err = processor.run("p1", &geometry, None).await.unwrap_err();
        assert!(matches!(err, EtlError::ProviderFailure(_)));
        assert!(repo.get("p1").await.unwrap().is_none());
    }
}
