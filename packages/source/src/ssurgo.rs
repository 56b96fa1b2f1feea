//! USDA Soil Data Access (SSURGO) tabular service.
//!
//! The service takes a T-SQL query and answers with
//! `{"Table": [[col, col, ...], ...]}`. Column order follows
//! [`COLUMNS`]; the last column is the map-unit polygon as WKT.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{SoilProvider, SoilRecord, SourceError, http};

pub const DEFAULT_URL: &str = "https://sdmdataaccess.nrcs.usda.gov/Tabular/post.rest";

const SOURCE: &str = "USDA_SSURGO";

/// Column names for the rows returned by [`build_query`].
pub const COLUMNS: [&str; 14] = [
    "mukey",
    "muname",
    "cokey",
    "compname",
    "comppct_r",
    "drainagecl",
    "depth_top",
    "depth_bottom",
    "ph",
    "organic_matter",
    "water_capacity",
    "sand",
    "clay",
    "wkt",
];

const WKT_COLUMN: &str = "wkt";

/// Major-component map units (with horizons) intersecting `aoi_wkt`.
#[must_use]
pub fn build_query(aoi_wkt: &str) -> String {
    let aoi = aoi_wkt.replace('\'', "''");
    format!(
        "SELECT mu.mukey, mu.muname, c.cokey, c.compname, c.comppct_r, c.drainagecl, \
         ch.hzdept_r, ch.hzdepb_r, ch.ph1to1h2o_r, ch.om_r, ch.awc_r, ch.sandtotal_r, \
         ch.claytotal_r, mp.mupolygongeo.STAsText() \
         FROM mupolygon mp \
         INNER JOIN mapunit mu ON mu.mukey = mp.mukey \
         INNER JOIN component c ON c.mukey = mu.mukey \
         LEFT JOIN chorizon ch ON ch.cokey = c.cokey \
         WHERE c.majcompflag = 'Yes' \
         AND mp.mupolygongeo.STIntersects(geometry::STGeomFromText('{aoi}', 4326)) = 1 \
         ORDER BY mu.mukey, c.cokey, ch.hzdept_r"
    )
}

/// Maps the `Table` rows of a response onto [`COLUMNS`].
///
/// A missing `Table` means no rows. Rows shorter than [`COLUMNS`] leave
/// the trailing columns null; extra cells are ignored.
///
/// # Errors
///
/// Returns [`SourceError::Response`] if `Table` or one of its rows is not
/// an array.
pub fn parse_rows(body: &Value) -> Result<Vec<SoilRecord>, SourceError> {
    let Some(table) = body.get("Table") else {
        return Ok(Vec::new());
    };
    let rows = table.as_array().ok_or_else(|| SourceError::Response {
        message: "soil response `Table` is not an array".to_string(),
    })?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row.as_array().ok_or_else(|| SourceError::Response {
                message: format!("soil response row {i} is not an array"),
            })?;

            let mut attributes = Map::new();
            let mut wkt = None;
            for (index, column) in COLUMNS.iter().enumerate() {
                let cell = cells.get(index).cloned().unwrap_or(Value::Null);
                if *column == WKT_COLUMN {
                    wkt = cell.as_str().map(str::to_string).filter(|s| !s.is_empty());
                } else {
                    attributes.insert((*column).to_string(), cell);
                }
            }

            Ok(SoilRecord { attributes, wkt })
        })
        .collect()
}

/// Queries SSURGO through Soil Data Access.
#[derive(Debug, Clone)]
pub struct Ssurgo {
    client: reqwest::Client,
    url: String,
}

impl Ssurgo {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl SoilProvider for Ssurgo {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn query(&self, aoi_wkt: &str) -> Result<Vec<SoilRecord>, SourceError> {
        let payload = json!({ "query": build_query(aoi_wkt), "format": "JSON" });
        let request = self.client.post(&self.url).json(&payload);
        let text = http::send_text(request).await?;

        // An empty result set comes back as an empty body.
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let body: Value = serde_json::from_str(&text)?;
        let records = parse_rows(&body)?;
        log::debug!("Soil Data Access returned {} rows", records.len());
        Ok(records)
    }
}
