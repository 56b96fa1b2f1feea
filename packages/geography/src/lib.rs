#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference boundary data and region resolution.
//!
//! Country and subdivision polygons are downloaded once as zipped
//! shapefiles, converted to `GeoJSON` documents and stored in the
//! `countries` and `subdivisions` collections. Project geometries are
//! resolved against them with a spatial intersection query. Every load is
//! registered in `datasets` and `refresh_jobs` so a refresh can be
//! scheduled a year out.

pub mod datasets;
pub mod loader;
pub mod region;
pub mod scheduler;
pub mod shapes;

pub use loader::{LoadOutcome, ReferenceLoader, insert_tolerant};
pub use region::RegionResolver;

use thiserror::Error;

/// Errors that can occur during geography operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] terrain_etl_database::DbError),

    /// Download failed.
    #[error("Source error: {0}")]
    Source(#[from] terrain_etl_source::SourceError),

    /// The submitted geometry is not usable.
    #[error("{0}")]
    Geometry(#[from] terrain_etl_geometry::GeometryError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A boundary archive could not be read.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A shapefile could not be read.
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// An embedded dataset definition is malformed.
    #[error("Dataset config error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
