//! `OpenTopography` global DEM API.

use async_trait::async_trait;
use terrain_etl_geometry::BoundingBox;

use crate::{ElevationProvider, SourceError, http};

pub const DEFAULT_BASE_URL: &str = "https://portal.opentopography.org/API/globaldem";
pub const DEFAULT_DEM_TYPE: &str = "SRTMGL3";

const SOURCE: &str = "OpenTopography";

/// Nominal resolution label for a global DEM type.
#[must_use]
pub fn resolution_for(dem_type: &str) -> &'static str {
    match dem_type.to_ascii_uppercase().as_str() {
        "SRTMGL1" | "SRTMGL1_E" | "NASADEM" | "AW3D30" | "AW3D30_E" | "COP30" => "30m",
        "SRTM15PLUS" => "500m",
        _ => "90m",
    }
}

/// Fetches elevation `GeoTIFF`s from the `OpenTopography` global DEM
/// endpoint.
#[derive(Debug, Clone)]
pub struct OpenTopography {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    dem_type: String,
    resolution: &'static str,
}

impl OpenTopography {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        dem_type: impl Into<String>,
    ) -> Self {
        let dem_type = dem_type.into();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            resolution: resolution_for(&dem_type),
            dem_type,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn dem_type(&self) -> &str {
        &self.dem_type
    }

    fn query(&self, bbox: &BoundingBox) -> Vec<(&'static str, String)> {
        vec![
            ("demtype", self.dem_type.clone()),
            ("south", bbox.min_y.to_string()),
            ("north", bbox.max_y.to_string()),
            ("west", bbox.min_x.to_string()),
            ("east", bbox.max_x.to_string()),
            ("outputFormat", "GTiff".to_string()),
            ("API_Key", self.api_key.clone()),
        ]
    }
}

#[async_trait]
impl ElevationProvider for OpenTopography {
    fn source(&self) -> &str {
        SOURCE
    }

    fn resolution(&self) -> &str {
        self.resolution
    }

    async fn fetch(&self, bbox: &BoundingBox) -> Result<Vec<u8>, SourceError> {
        if self.api_key.is_empty() {
            return Err(SourceError::Response {
                message: "OPENTOPO_API_KEY is not set".to_string(),
            });
        }

        log::info!(
            "Requesting {} DEM for [{:.4}, {:.4}, {:.4}, {:.4}]",
            self.dem_type,
            bbox.min_x,
            bbox.min_y,
            bbox.max_x,
            bbox.max_y
        );

        let request = self.client.get(&self.base_url).query(&self.query(bbox));
        let bytes = http::send_bytes(request).await?;
        log::debug!("OpenTopography returned {} bytes", bytes.len());

        http::ensure_tiff(bytes, SOURCE)
    }
}
