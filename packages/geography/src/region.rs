//! Resolves a project geometry to the country and subdivision it lies in.

use std::sync::Arc;

use geo::MultiPolygon;
use serde_json::Value;
use terrain_etl_database::{DocumentStore, Filter, collections};
use terrain_etl_terrain_models::Region;

use crate::GeoError;

/// Looks up reference boundaries intersecting a geometry.
#[derive(Clone)]
pub struct RegionResolver {
    store: Arc<dyn DocumentStore>,
}

impl RegionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Normalizes `geometry` and resolves it.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Geometry`] if the geometry is not a usable
    /// polygon. Lookup failures do not error; see [`Self::resolve_polygons`].
    pub async fn resolve(&self, geometry: &Value) -> Result<Region, GeoError> {
        let normalized = terrain_etl_geometry::normalize(geometry)?;
        Ok(self.resolve_polygons(normalized.polygons()).await)
    }

    /// Returns the first intersecting country and, independently, the
    /// first intersecting subdivision. A failed lookup is logged and
    /// leaves its half of the region empty.
    pub async fn resolve_polygons(&self, polygons: &MultiPolygon<f64>) -> Region {
        let filter = Filter::intersects("geometry", polygons);

        let (country, country_name) = self
            .first_match(collections::COUNTRIES, &filter)
            .await
            .unwrap_or_default();
        let (subdivision, subdivision_name) = self
            .first_match(collections::SUBDIVISIONS, &filter)
            .await
            .unwrap_or_default();

        let region = Region {
            country,
            country_name,
            subdivision,
            subdivision_name,
        };
        log::info!(
            "Region resolved country={} ({}) subdivision={} ({})",
            region.country.as_deref().unwrap_or("-"),
            region.country_name.as_deref().unwrap_or("-"),
            region.subdivision.as_deref().unwrap_or("-"),
            region.subdivision_name.as_deref().unwrap_or("-"),
        );
        region
    }

    async fn first_match(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Option<(Option<String>, Option<String>)> {
        match self.store.find_one(collection, filter).await {
            Ok(Some(document)) => Some((text(&document, "code"), text(&document, "name"))),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Region lookup in {collection} failed: {e}");
                None
            }
        }
    }
}

fn text(document: &Value, field: &str) -> Option<String> {
    document
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}
