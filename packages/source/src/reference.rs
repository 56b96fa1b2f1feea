//! Plain HTTP downloads for reference datasets.

use async_trait::async_trait;

use crate::{ReferenceSource, SourceError, http};

#[derive(Debug, Clone)]
pub struct HttpReferenceSource {
    client: reqwest::Client,
}

impl HttpReferenceSource {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceSource for HttpReferenceSource {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        log::info!("Downloading {url}");
        let bytes = http::send_bytes(self.client.get(url)).await?;
        log::info!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
