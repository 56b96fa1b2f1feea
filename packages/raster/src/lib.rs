#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raster processing for terrain layers.
//!
//! Decodes single-band `GeoTIFF` payloads into [`Grid`]s, aligns them
//! (square padding, polygon cropping, nearest-neighbour resampling) and
//! burns vector polygons onto a grid that shares the elevation
//! transform.
//!
//! [`Grid`]: terrain_etl_terrain_models::Grid

pub mod geotiff;
pub mod ops;
pub mod rasterize;

pub use geotiff::{DecodedRaster, decode, encode};
pub use ops::{crop_to_bounds, min_max, pad_to_square, replace_nodata, resample_nearest};
pub use rasterize::rasterize;

use thiserror::Error;

/// Errors that can occur while processing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// TIFF decoding or encoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The image carries no usable georeferencing tags.
    #[error("Georeferencing error: {message}")]
    Georeferencing {
        /// Description of what went wrong.
        message: String,
    },

    /// The pixel → world transform cannot be inverted.
    #[error("Transform is not invertible")]
    SingularTransform,

    /// A crop window does not overlap the grid.
    #[error("Crop window is empty")]
    EmptyWindow,

    /// The grid has no cells.
    #[error("Grid is empty")]
    EmptyGrid,

    /// Grid dimensions are inconsistent with its data.
    #[error("Shape error: {message}")]
    Shape {
        /// Description of what went wrong.
        message: String,
    },
}
