//! The per-project terrain document and its layers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::grid::{GeoTransform, Grid, GridBounds};

/// A terrain layer produced by the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LayerName {
    Dem,
    Soil,
    #[strum(to_string = "land_cover", serialize = "landcover", serialize = "land-cover")]
    LandCover,
}

impl LayerName {
    /// Key under `etl_layers`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Dem => "dem",
            Self::Soil => "soil",
            Self::LandCover => "land_cover",
        }
    }

    /// Top-level document field holding this layer's data.
    #[must_use]
    pub const fn data_field(self) -> &'static str {
        match self {
            Self::Dem => "elevation_data",
            Self::Soil => "soil_data",
            Self::LandCover => "land_cover",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayerState {
    Ok,
    Failed,
}

/// Outcome of the most recent run of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub status: LayerState,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LayerStatus {
    #[must_use]
    pub const fn ok(updated_at: DateTime<Utc>) -> Self {
        Self {
            status: LayerState::Ok,
            updated_at,
            error: None,
            note: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: LayerState::Failed,
            updated_at,
            error: Some(error.into()),
            note: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == LayerState::Ok
    }
}

/// Country and first-level subdivision containing a geometry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision_name: Option<String>,
}

/// A project as handed to the pipeline by the project service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub project_id: String,
    pub geometry: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationData {
    pub heightmap: Grid<f64>,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub bounds: GridBounds,
    pub transform: GeoTransform,
    pub resolution: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// Soil layer: rasterized map-unit ids plus the tabular attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilData {
    pub source: String,
    /// Raw attribute rows as returned by the provider (geometry removed).
    pub map_units: Vec<serde_json::Map<String, serde_json::Value>>,
    /// `mukey` → attributes of that map unit.
    pub units: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    /// Grid id (as a string) → `mukey`.
    pub index_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Grid<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GridBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<GeoTransform>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverUnit {
    pub name: String,
}

/// Land cover layer: class codes per cell plus their names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverData {
    pub source: String,
    pub year: i32,
    pub grid: Grid<i32>,
    /// Class code (as a string) → class name.
    pub index_map: BTreeMap<String, String>,
    pub units: BTreeMap<String, LandCoverUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GridBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<GeoTransform>,
    pub fetched_at: DateTime<Utc>,
}

/// Everything the pipeline knows about one project's terrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainDocument {
    pub project_id: String,
    /// The boundary the last pipeline run was given, as submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_data: Option<ElevationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_data: Option<SoilData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_cover: Option<LandCoverData>,
    #[serde(default)]
    pub etl_layers: BTreeMap<String, LayerStatus>,
    /// Outcome of the last full pipeline run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<LayerStatus>,
}

impl TerrainDocument {
    #[must_use]
    pub fn layer_status(&self, layer: LayerName) -> Option<&LayerStatus> {
        self.etl_layers.get(layer.key())
    }

    /// The stored DEM, if it has a usable heightmap.
    #[must_use]
    pub fn usable_elevation(&self) -> Option<&ElevationData> {
        self.elevation_data
            .as_ref()
            .filter(|elevation| !elevation.heightmap.is_empty())
    }
}
