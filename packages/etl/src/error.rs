use terrain_etl_database::DbError;
use terrain_etl_geography::GeoError;
use terrain_etl_geometry::GeometryError;
use terrain_etl_raster::RasterError;
use terrain_etl_source::SourceError;

/// Errors that can occur while running the terrain pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// The project geometry is unusable.
    #[error("{0}")]
    InvalidGeometry(#[from] GeometryError),

    /// A layer ran before the data it depends on was stored.
    #[error("Missing prerequisite: {message}")]
    MissingPrerequisite {
        /// What is missing.
        message: String,
    },

    /// No country ETL is registered for the resolved region.
    #[error("No ETL module defined for country {code}")]
    UnsupportedRegion {
        /// The requested code, `(unknown)` when unresolved.
        code: String,
    },

    /// The country has no ETL for the requested layer.
    #[error("Unsupported {country} layer ETL: {layer}")]
    UnsupportedLayer {
        country: String,
        layer: String,
    },

    /// An external provider failed.
    #[error("Provider failure: {0}")]
    ProviderFailure(#[from] SourceError),

    /// Vector → raster burning failed.
    #[error("Rasterization failed: {message}")]
    RasterizationFailure {
        /// Description of what went wrong.
        message: String,
    },

    /// A provider answered but returned nothing usable.
    #[error("No features: {message}")]
    NoFeatures {
        /// Description of what went wrong.
        message: String,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Raster decoding or processing failed.
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// Reference dataset loading failed.
    #[error("Reference data error: {0}")]
    Reference(#[from] GeoError),

    /// The land cover legend could not be read.
    #[error("Legend CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker queue no longer accepts jobs.
    #[error("ETL worker is shut down")]
    WorkerClosed,
}

impl EtlError {
    pub(crate) fn missing(message: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            message: message.into(),
        }
    }
}
