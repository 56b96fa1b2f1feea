#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Project geometry handling.
//!
//! Every terrain run starts from a user-drawn polygon submitted as
//! `GeoJSON`. This crate reduces the accepted wrappers (`FeatureCollection`,
//! `Feature`, bare geometry) to a single [`NormalizedGeometry`], computes
//! its geodesic area, and derives the buffered square [`BoundingBox`] used
//! to request elevation tiles.

pub mod area;
pub mod bbox;
pub mod normalize;
pub mod polygons;

pub use area::{area_hectares, compute_area_hectares};
pub use bbox::{BoundingBox, BufferPolicy};
pub use normalize::{GeometryKind, NormalizedGeometry, normalize};
pub use polygons::{parse_wkt_polygons, polygonal, repair, to_geojson};

use thiserror::Error;

/// Errors that can occur while interpreting a project geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The input is not a polygonal `GeoJSON` geometry.
    #[error("Invalid geometry: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl GeometryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
