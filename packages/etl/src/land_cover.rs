//! Land cover layer: Cropland Data Layer classes on the DEM grid.
//!
//! The classification raster is requested for the project bounds in
//! EPSG:5070 and resampled to the heightmap shape. When the fetch fails
//! and fallback is allowed, the stored soil grid stands in for it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use geo::Rect;
use serde_json::Value;
use terrain_etl_database::{DbError, DocumentStore, Filter, TerrainRepository, collections};
use terrain_etl_geography::loader::download_if_missing;
use terrain_etl_geography::{LoadOutcome, insert_tolerant, scheduler};
use terrain_etl_geometry::BoundingBox;
use terrain_etl_raster::{self as raster, DecodedRaster, RasterError};
use terrain_etl_source::cache::DiskCache;
use terrain_etl_source::{LandCoverProvider, ReferenceSource, projection};
use terrain_etl_terrain_models::{
    GeoTransform, Grid, GridBounds, LandCoverData, LandCoverKey, LandCoverUnit, LayerName,
    LayerStatus, ProjectRef, TerrainDocument,
};

use crate::{EtlError, LayerOutcome};

pub const LEGEND_URL: &str =
    "https://www.nass.usda.gov/Research_and_Science/Cropland/metadata/MetaData_CDL_2023.csv";
pub const LEGEND_FILE: &str = "cdl_legend_2023.csv";
pub const KEYS_DATASET: &str = "land_cover_keys";

/// Status note when the soil grid was stored in place of land cover.
pub const FALLBACK_NOTE: &str = "fallback_soil";

const CODE_COLUMNS: &[&str] = &["code", "Value", "VALUE"];
const NAME_COLUMNS: &[&str] = &["name", "Class_Name", "CLASS_NAME"];

/// Parses the CDL legend CSV into class keys.
///
/// Rows with a non-integer code or an empty name are skipped.
///
/// # Errors
///
/// Returns [`EtlError::Csv`] if the CSV is malformed, or
/// [`EtlError::NoFeatures`] if no code or name column is present.
pub fn parse_legend(bytes: &[u8]) -> Result<Vec<LandCoverKey>, EtlError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| headers.iter().position(|h| h.trim() == *name))
    };
    let (Some(code_column), Some(name_column)) = (column(CODE_COLUMNS), column(NAME_COLUMNS))
    else {
        return Err(EtlError::NoFeatures {
            message: "land cover legend has no code/name columns".to_string(),
        });
    };

    let mut keys = Vec::new();
    for record in reader.records() {
        let record = record?;
        let (Some(code), Some(name)) = (record.get(code_column), record.get(name_column)) else {
            continue;
        };
        let name = name.trim();
        match code.trim().parse::<i64>() {
            Ok(code) if !name.is_empty() => keys.push(LandCoverKey {
                code,
                name: name.to_string(),
            }),
            _ => log::debug!("Skipping legend row code={code:?} name={name:?}"),
        }
    }
    Ok(keys)
}

/// Fills `land_cover_keys` from the CDL legend unless it already holds
/// documents, and registers the dataset for yearly refresh.
///
/// # Errors
///
/// Returns [`EtlError`] if the download, parse or any store write fails.
pub async fn load_land_cover_keys(
    store: &dyn DocumentStore,
    source: &dyn ReferenceSource,
    datasets_dir: &Path,
) -> Result<LoadOutcome, EtlError> {
    let existing = store.count(collections::LAND_COVER_KEYS, &Filter::All).await?;
    if existing > 0 {
        log::info!("Land cover keys already loaded ({existing})");
        return Ok(LoadOutcome::Skipped { existing });
    }

    let path = download_if_missing(source, LEGEND_URL, &datasets_dir.join(LEGEND_FILE)).await?;
    let bytes = tokio::fs::read(&path).await?;
    let keys = parse_legend(&bytes)?;
    let documents = keys
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::from)?;

    let inserted = insert_tolerant(store, collections::LAND_COVER_KEYS, documents).await;
    scheduler::register_dataset(
        store,
        KEYS_DATASET,
        scheduler::DEFAULT_INTERVAL_DAYS,
        Utc::now(),
    )
    .await?;
    log::info!("Land cover keys loaded ({inserted} rows)");
    Ok(LoadOutcome::Loaded { inserted })
}

#[allow(clippy::cast_possible_truncation)]
fn class_code(value: f64) -> i32 {
    if value.is_finite() {
        value.round() as i32
    } else {
        0
    }
}

/// A grid to store plus the georeferencing it came with.
struct ClassGrid {
    grid: Grid<i32>,
    bounds: Option<GridBounds>,
    transform: Option<GeoTransform>,
}

/// Fetches and stores the land cover layer of a project.
#[derive(Clone)]
pub struct LandCoverEtl {
    repo: TerrainRepository,
    provider: Arc<dyn LandCoverProvider>,
    cache: DiskCache,
    allow_fallback: bool,
}

impl LandCoverEtl {
    /// Soil fallback is allowed by default.
    #[must_use]
    pub fn new(
        repo: TerrainRepository,
        provider: Arc<dyn LandCoverProvider>,
        cache: DiskCache,
    ) -> Self {
        Self {
            repo,
            provider,
            cache,
            allow_fallback: true,
        }
    }

    #[must_use]
    pub const fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    /// Runs the land cover layer.
    ///
    /// # Errors
    ///
    /// Returns the fetch or decode error (after persisting a failed
    /// status) when no fallback grid can be used, and
    /// [`EtlError::Database`] if reading or writing the terrain fails.
    pub async fn run(&self, project: &ProjectRef) -> Result<LayerOutcome, EtlError> {
        let project_id = project.project_id.as_str();
        let geometry = terrain_etl_geometry::normalize(&project.geometry)?;
        let bounds = geometry
            .bounds()
            .ok_or_else(|| EtlError::missing("geometry has no bounds"))?;

        let terrain = self.repo.get(project_id).await?.unwrap_or_default();
        let elevation = terrain.usable_elevation();

        let (classes, status) = match self.fetch(project_id, bounds).await {
            Ok(decoded) => {
                let grid = decoded.grid.map(|v| class_code(*v));
                let classes = ClassGrid {
                    bounds: Some(GridBounds::from_transform(
                        grid.rows(),
                        grid.cols(),
                        &decoded.transform,
                    )),
                    transform: Some(decoded.transform),
                    grid,
                };
                (classes, LayerStatus::ok(Utc::now()))
            }
            Err(e) => {
                if let Some(classes) = self.fallback(&terrain) {
                    log::warn!(
                        "Land cover fetch failed for project {project_id} ({e}); using soil grid"
                    );
                    (classes, LayerStatus::ok(Utc::now()).with_note(FALLBACK_NOTE))
                } else {
                    log::error!("Land cover ETL failed for project {project_id}: {e}");
                    let status = LayerStatus::failed(e.to_string(), Utc::now());
                    self.repo
                        .set_layer_status(project_id, LayerName::LandCover, &status)
                        .await?;
                    return Err(e);
                }
            }
        };

        let grid = match elevation.map(|e| e.heightmap.shape()) {
            Some((rows, cols)) if classes.grid.shape() != (rows, cols) => {
                log::debug!(
                    "Resampling land cover {}x{} to {rows}x{cols}",
                    classes.grid.rows(),
                    classes.grid.cols()
                );
                raster::resample_nearest(&classes.grid, rows, cols)?
            }
            _ => classes.grid,
        };

        let names = self.class_names().await?;
        let codes: BTreeSet<i32> = grid.cells().iter().copied().collect();
        let index_map: BTreeMap<String, String> = codes
            .iter()
            .map(|code| {
                let key = code.to_string();
                let name = names.get(&key).cloned().unwrap_or_else(|| key.clone());
                (key, name)
            })
            .collect();
        let units = index_map
            .iter()
            .map(|(code, name)| (code.clone(), LandCoverUnit { name: name.clone() }))
            .collect();

        let land_cover = LandCoverData {
            source: self.provider.source().to_string(),
            year: self.provider.year(),
            grid,
            index_map,
            units,
            bounds: elevation.map(|e| e.bounds).or(classes.bounds),
            transform: elevation.map(|e| e.transform).or(classes.transform),
            fetched_at: Utc::now(),
        };
        self.repo
            .save_layer(project_id, LayerName::LandCover, Some(&land_cover), &status)
            .await?;
        log::info!(
            "Land cover ETL stored for project {project_id} ({} classes)",
            codes.len()
        );

        Ok(LayerOutcome::new(LayerName::LandCover, status, codes.len()))
    }

    async fn fetch(&self, project_id: &str, bounds: Rect<f64>) -> Result<DecodedRaster, EtlError> {
        let projected = projection::to_conus_albers(&BoundingBox::from_rect(bounds))?;
        let name = format!("cdl_{}_{}.tif", self.provider.year(), projected.cache_key());

        let bytes = if let Some(bytes) = self.cache.get(&name).await? {
            log::info!("Land cover cache hit for project {project_id} ({name})");
            bytes
        } else {
            log::info!(
                "Land cover fetch start for project {project_id} (bbox={})",
                projected.to_query()
            );
            let bytes = self.provider.fetch(&projected).await?;
            if let Err(e) = self.cache.put(&name, &bytes).await {
                log::warn!("Could not cache land cover {name}: {e}");
            }
            bytes
        };

        let decoded = tokio::task::spawn_blocking(move || raster::decode(&bytes))
            .await
            .map_err(|e| RasterError::Shape {
                message: format!("land cover decode task failed: {e}"),
            })??;
        if decoded.grid.is_empty() {
            return Err(RasterError::EmptyGrid.into());
        }
        Ok(decoded)
    }

    fn fallback(&self, terrain: &TerrainDocument) -> Option<ClassGrid> {
        if !self.allow_fallback {
            return None;
        }
        let soil = terrain.soil_data.as_ref()?;
        let grid = soil.grid.clone().filter(|grid| !grid.is_empty())?;
        Some(ClassGrid {
            grid,
            bounds: soil.bounds,
            transform: soil.transform,
        })
    }

    /// `code → name` from `land_cover_keys`.
    async fn class_names(&self) -> Result<BTreeMap<String, String>, EtlError> {
        let documents = self
            .repo
            .store()
            .find(collections::LAND_COVER_KEYS, &Filter::All)
            .await?;
        Ok(documents
            .iter()
            .filter_map(|document| {
                let code = match document.get("code")? {
                    Value::String(code) => code.trim().to_string(),
                    Value::Number(code) => code.to_string(),
                    _ => return None,
                };
                let name = document.get("name")?.as_str()?.to_string();
                Some((code, name))
            })
            .collect())
    }
}
