//! USDA NASS Cropland Data Layer through the `CropScape` web service.
//!
//! `GetCDLFile` answers with a small XML document whose `<returnURL>`
//! points at a `GeoTIFF` clipped to the requested EPSG:5070 box; a second
//! request downloads it.

use async_trait::async_trait;

use crate::{LandCoverProvider, ProjectedBox, SourceError, http};

pub const DEFAULT_URL: &str = "https://nassgeodata.gmu.edu/axis2/services/CDLService/GetCDLFile";
pub const DEFAULT_YEAR: i32 = 2023;

const SOURCE: &str = "USDA_CDL";

/// Extracts the trimmed `<returnURL>` value from a `GetCDLFile` response.
#[must_use]
pub fn parse_return_url(body: &str) -> Option<String> {
    const OPEN: &str = "<returnURL>";
    const CLOSE: &str = "</returnURL>";

    let start = body.find(OPEN)? + OPEN.len();
    let end = body[start..].find(CLOSE)? + start;
    let url = body[start..end].trim();
    (!url.is_empty()).then(|| url.to_string())
}

#[derive(Debug, Clone)]
pub struct CropScape {
    client: reqwest::Client,
    url: String,
    year: i32,
}

impl CropScape {
    #[must_use]
    pub fn new(client: reqwest::Client, year: i32) -> Self {
        Self {
            client,
            url: DEFAULT_URL.to_string(),
            year,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LandCoverProvider for CropScape {
    fn source(&self) -> &str {
        SOURCE
    }

    fn year(&self) -> i32 {
        self.year
    }

    async fn fetch(&self, bbox: &ProjectedBox) -> Result<Vec<u8>, SourceError> {
        let bbox_param = bbox.to_query();
        log::info!("Requesting CDL {} for bbox {bbox_param}", self.year);

        let request = self
            .client
            .get(&self.url)
            .query(&[("year", self.year.to_string()), ("bbox", bbox_param)]);
        let body = http::send_text(request).await?;

        let tif_url = parse_return_url(&body).ok_or_else(|| SourceError::Response {
            message: format!(
                "CDL service did not return a URL: {}",
                http::preview(&body)
            ),
        })?;
        log::debug!("CDL file ready at {tif_url}");

        let bytes = http::send_bytes(self.client.get(&tif_url)).await?;
        http::ensure_tiff(bytes, SOURCE)
    }
}
