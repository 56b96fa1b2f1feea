#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! External data providers for the terrain pipeline.
//!
//! Each remote dependency sits behind a small async trait so the layer
//! ETLs receive their providers by injection and tests can swap in
//! fakes:
//!
//! - [`ElevationProvider`]: raw elevation `GeoTIFF` for a bounding box
//!   ([`opentopography::OpenTopography`]).
//! - [`SoilProvider`]: soil map-unit rows with polygon WKT
//!   ([`ssurgo::Ssurgo`]).
//! - [`LandCoverProvider`]: classified land cover `GeoTIFF`
//!   ([`cdl::CropScape`]).
//! - [`ReferenceSource`]: bulk downloads of boundary archives and legends
//!   ([`reference::HttpReferenceSource`]).

pub mod cache;
pub mod cdl;
pub mod faults;
pub mod http;
pub mod opentopography;
pub mod projection;
pub mod reference;
pub mod retry;
pub mod ssurgo;

use async_trait::async_trait;
use serde_json::{Map, Value};
use terrain_etl_geometry::BoundingBox;

pub use projection::ProjectedBox;

/// Errors that can occur while talking to external providers.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider answered with something unusable.
    #[error("Provider response error: {message}")]
    Response {
        /// Description of what went wrong.
        message: String,
    },

    /// A coordinate transformation failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },
}

/// One soil map-unit row.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilRecord {
    /// Column name → value, without the geometry column.
    pub attributes: Map<String, Value>,
    /// Map-unit polygon as WKT, when the provider returned one.
    pub wkt: Option<String>,
}

impl SoilRecord {
    /// The trimmed `mukey`, if present and non-empty.
    #[must_use]
    pub fn mukey(&self) -> Option<String> {
        let key = match self.attributes.get("mukey")? {
            Value::String(s) => s.trim().to_string(),
            Value::Null => return None,
            other => other.to_string(),
        };
        (!key.is_empty()).then_some(key)
    }
}

/// Supplies raw elevation rasters.
#[async_trait]
pub trait ElevationProvider: Send + Sync {
    /// Label stored as the elevation `source`.
    fn source(&self) -> &str;

    /// Nominal resolution label stored with the heightmap (e.g. `"90m"`).
    fn resolution(&self) -> &str;

    /// Fetches a `GeoTIFF` covering `bbox` (EPSG:4326).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails or the response is not
    /// a `GeoTIFF`.
    async fn fetch(&self, bbox: &BoundingBox) -> Result<Vec<u8>, SourceError>;
}

/// Supplies soil map units intersecting an area of interest.
#[async_trait]
pub trait SoilProvider: Send + Sync {
    /// Label stored as the soil `source`.
    fn source(&self) -> &str;

    /// Queries map units intersecting the WKT polygon (EPSG:4326).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or response parsing fails.
    async fn query(&self, aoi_wkt: &str) -> Result<Vec<SoilRecord>, SourceError>;
}

/// Supplies classified land cover rasters.
#[async_trait]
pub trait LandCoverProvider: Send + Sync {
    /// Label stored as the land cover `source`.
    fn source(&self) -> &str;

    /// Classification year.
    fn year(&self) -> i32;

    /// Fetches a `GeoTIFF` covering `bbox` (EPSG:5070 metres).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if either request fails.
    async fn fetch(&self, bbox: &ProjectedBox) -> Result<Vec<u8>, SourceError>;
}

/// Downloads reference dataset files.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Downloads the resource at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the download fails.
    async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn mukey_is_trimmed_and_stringified() {
        let mut attributes = Map::new();
        attributes.insert("mukey".to_string(), json!(" 123 "));
        let record = SoilRecord {
            attributes: attributes.clone(),
            wkt: None,
        };
        assert_eq!(record.mukey().as_deref(), Some("123"));

        attributes.insert("mukey".to_string(), json!(456));
        let record = SoilRecord { attributes, wkt: None };
        assert_eq!(record.mukey().as_deref(), Some("456"));
    }

    #[test]
    fn missing_mukey_is_none() {
        let mut attributes = Map::new();
        attributes.insert("mukey".to_string(), json!("  "));
        assert!(SoilRecord { attributes, wkt: None }.mukey().is_none());
        assert!(SoilRecord { attributes: Map::new(), wkt: None }.mukey().is_none());
    }
}
