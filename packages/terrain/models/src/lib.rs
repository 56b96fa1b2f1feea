#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terrain data types shared across the pipeline.
//!
//! Every layer stored on a [`TerrainDocument`] is a [`Grid`] co-registered
//! with the elevation heightmap: same rows, same columns, same
//! [`GeoTransform`].

pub mod grid;
pub mod reference;
pub mod terrain;

pub use grid::{GeoTransform, Grid, GridBounds, RaggedRowsError};
pub use reference::{CountryRecord, DatasetMetadata, LandCoverKey, RefreshJob, SubdivisionRecord};
pub use terrain::{
    ElevationData, LandCoverData, LandCoverUnit, LayerName, LayerState, LayerStatus, ProjectRef,
    Region, SoilData, TerrainDocument,
};
