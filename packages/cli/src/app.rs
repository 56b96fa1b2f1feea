//! Builds the store, providers and pipeline from an [`EtlConfig`].

use std::sync::Arc;

use terrain_etl::country::UsaEtl;
use terrain_etl::dem::DemProcessor;
use terrain_etl::land_cover::LandCoverEtl;
use terrain_etl::soil::SoilEtl;
use terrain_etl::{CountryRegistry, EtlConfig, StoreConfig, TerrainPipeline};
use terrain_etl_database::{DocumentStore, DuckDbStore, MemoryStore, TerrainRepository};
use terrain_etl_geography::{GeoError, ReferenceLoader, RegionResolver};
use terrain_etl_source::cache::DiskCache;
use terrain_etl_source::cdl::{self, CropScape};
use terrain_etl_source::faults::FailOnceLandCover;
use terrain_etl_source::opentopography::OpenTopography;
use terrain_etl_source::reference::HttpReferenceSource;
use terrain_etl_source::ssurgo::Ssurgo;
use terrain_etl_source::{LandCoverProvider, ReferenceSource, http};

/// Everything a command needs, wired once per process.
pub struct App {
    pub config: EtlConfig,
    pub store: Arc<dyn DocumentStore>,
    pub repo: TerrainRepository,
    pub resolver: RegionResolver,
    pub pipeline: Arc<TerrainPipeline>,
    reference: Arc<dyn ReferenceSource>,
}

impl App {
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the HTTP client
    /// cannot be built.
    pub fn build(config: EtlConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn DocumentStore> = match &config.store {
            StoreConfig::DuckDb(path) => Arc::new(DuckDbStore::open(path)?),
            StoreConfig::Memory => {
                log::warn!("Using an in-memory store; nothing will be kept after exit");
                Arc::new(MemoryStore::new())
            }
        };
        if config.opentopo_api_key.is_empty() {
            log::warn!("OPENTOPO_API_KEY is not set; DEM fetches will fail");
        }

        let client = http::client(config.http_timeout)?;
        let repo = TerrainRepository::new(store.clone());
        let resolver = RegionResolver::new(store.clone());
        let reference: Arc<dyn ReferenceSource> =
            Arc::new(HttpReferenceSource::new(client.clone()));

        let dem = DemProcessor::new(
            repo.clone(),
            Arc::new(OpenTopography::new(
                client.clone(),
                config.opentopo_api_key.clone(),
                config.dem_type.clone(),
            )),
            DiskCache::new(config.dem_cache_dir()),
        )
        .with_crop(config.crop_dem);

        let cdl = CropScape::new(client.clone(), cdl::DEFAULT_YEAR);
        let land_cover_provider: Arc<dyn LandCoverProvider> =
            if config.force_land_cover_error_once {
                log::warn!("The first land cover fetch of this process will be forced to fail");
                Arc::new(FailOnceLandCover::new(cdl))
            } else {
                Arc::new(cdl)
            };

        let soil = SoilEtl::new(repo.clone(), Arc::new(Ssurgo::new(client)));
        let land_cover = LandCoverEtl::new(
            repo.clone(),
            land_cover_provider,
            DiskCache::new(config.land_cover_cache_dir()),
        )
        .with_fallback(config.allow_land_cover_fallback);

        let mut countries = CountryRegistry::new();
        countries.register(Arc::new(UsaEtl::new(
            soil,
            land_cover,
            store.clone(),
            reference.clone(),
            config.datasets_dir(),
        )));

        let pipeline = Arc::new(TerrainPipeline::new(
            repo.clone(),
            resolver.clone(),
            dem,
            Arc::new(countries),
        ));

        Ok(Self {
            config,
            store,
            repo,
            resolver,
            pipeline,
            reference,
        })
    }

    /// Loads countries and configured subdivisions, then runs each
    /// configured country's initializer.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the country boundaries cannot be loaded.
    pub async fn initialize(&self) -> Result<(), GeoError> {
        ReferenceLoader::new(
            self.store.clone(),
            self.reference.clone(),
            self.config.datasets_dir(),
        )
        .ensure_all(&self.config.countries)
        .await?;
        self.pipeline
            .countries()
            .initialize_configured(&self.config.countries)
            .await;
        Ok(())
    }
}
