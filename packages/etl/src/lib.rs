#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terrain ETL pipeline.
//!
//! For each project the pipeline normalizes the boundary, resolves the
//! country it lies in, builds the elevation heightmap and then hands the
//! project to that country's layer ETLs (soil, land cover). Every layer
//! is rasterized onto the DEM grid and its outcome is recorded under
//! `etl_layers` on the project's terrain document, so a failed layer can
//! be re-run on its own with [`pipeline::TerrainPipeline::backfill`].
//!
//! Runs are normally submitted to an [`worker::EtlWorker`], which bounds
//! how many projects are processed at once.

pub mod config;
pub mod country;
pub mod dem;
pub mod error;
pub mod land_cover;
pub mod pipeline;
pub mod soil;
pub mod worker;

pub use config::{EtlConfig, StoreConfig};
pub use country::{CountryEtl, CountryRegistry};
pub use error::EtlError;
pub use pipeline::TerrainPipeline;
pub use worker::EtlWorker;

use terrain_etl_terrain_models::{LayerName, LayerStatus};

/// What one layer ETL run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutcome {
    pub layer: LayerName,
    /// The status that was persisted for the layer.
    pub status: LayerStatus,
    /// Rows or cells the layer was built from.
    pub count: usize,
}

impl LayerOutcome {
    #[must_use]
    pub const fn new(layer: LayerName, status: LayerStatus, count: usize) -> Self {
        Self {
            layer,
            status,
            count,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
