//! United States: SSURGO soil and Cropland Data Layer land cover.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use terrain_etl_database::DocumentStore;
use terrain_etl_source::ReferenceSource;
use terrain_etl_terrain_models::{LayerName, ProjectRef};

use super::CountryEtl;
use crate::land_cover::{self, LandCoverEtl};
use crate::soil::SoilEtl;
use crate::{EtlError, LayerOutcome};

const LAYERS: &[LayerName] = &[LayerName::Soil, LayerName::LandCover];

pub struct UsaEtl {
    soil: SoilEtl,
    land_cover: LandCoverEtl,
    store: Arc<dyn DocumentStore>,
    reference: Arc<dyn ReferenceSource>,
    datasets_dir: PathBuf,
}

impl UsaEtl {
    #[must_use]
    pub fn new(
        soil: SoilEtl,
        land_cover: LandCoverEtl,
        store: Arc<dyn DocumentStore>,
        reference: Arc<dyn ReferenceSource>,
        datasets_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            soil,
            land_cover,
            store,
            reference,
            datasets_dir: datasets_dir.into(),
        }
    }
}

#[async_trait]
impl CountryEtl for UsaEtl {
    fn code(&self) -> &str {
        "USA"
    }

    fn layers(&self) -> &[LayerName] {
        LAYERS
    }

    async fn initialize(&self) -> Result<(), EtlError> {
        land_cover::load_land_cover_keys(
            self.store.as_ref(),
            self.reference.as_ref(),
            &self.datasets_dir,
        )
        .await?;
        Ok(())
    }

    async fn run_layer(
        &self,
        layer: LayerName,
        project: &ProjectRef,
    ) -> Result<LayerOutcome, EtlError> {
        match layer {
            LayerName::Soil => self.soil.run(project).await,
            LayerName::LandCover => self.land_cover.run(project).await,
            LayerName::Dem => Err(EtlError::UnsupportedLayer {
                country: self.code().to_string(),
                layer: layer.to_string(),
            }),
        }
    }
}
