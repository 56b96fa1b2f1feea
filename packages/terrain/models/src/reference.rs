//! Reference dataset records and their refresh bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A country boundary in the `countries` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    /// ISO 3166-1 alpha-3 code, `UNK` when the source has none.
    pub code: String,
    pub name: String,
    /// `GeoJSON` `MultiPolygon`.
    pub geometry: serde_json::Value,
}

/// A first-level subdivision (state, county, ...) in the `subdivisions`
/// collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdivisionRecord {
    /// Parent country code.
    pub country: String,
    pub code: String,
    pub name: String,
    pub geometry: serde_json::Value,
}

/// One land cover class from the legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverKey {
    pub code: i64,
    pub name: String,
}

/// Written to `datasets` whenever a reference collection is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub name: String,
    pub downloaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Written to `refresh_jobs` alongside [`DatasetMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshJob {
    pub name: String,
    pub next_run_at: DateTime<Utc>,
    pub interval_days: u32,
}
