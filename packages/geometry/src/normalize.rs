//! Reduces submitted `GeoJSON` to a bare polygonal geometry.

use geo::{BoundingRect, MultiPolygon, Rect};
use serde_json::Value;
use wkt::ToWkt;

use crate::GeometryError;

/// The polygonal geometry type a project was submitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Polygon,
    MultiPolygon,
}

/// A project geometry in EPSG:4326, kept both as the canonical bare
/// `GeoJSON` value and as parsed polygons.
#[derive(Debug, Clone)]
pub struct NormalizedGeometry {
    kind: GeometryKind,
    geojson: Value,
    polygons: MultiPolygon<f64>,
}

impl NormalizedGeometry {
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        self.kind
    }

    /// The bare `GeoJSON` geometry object (`type` + `coordinates`).
    #[must_use]
    pub const fn geojson(&self) -> &Value {
        &self.geojson
    }

    /// The geometry as a multipolygon (a `Polygon` becomes a single part).
    #[must_use]
    pub const fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Axis-aligned bounds of all parts.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.polygons.bounding_rect()
    }

    /// Renders the geometry as WKT, preserving `POLYGON` vs `MULTIPOLYGON`.
    #[must_use]
    pub fn to_wkt(&self) -> String {
        match (self.kind, self.polygons.0.first()) {
            (GeometryKind::Polygon, Some(polygon)) => polygon.wkt_string(),
            _ => self.polygons.wkt_string(),
        }
    }
}

/// Normalizes a submitted geometry.
///
/// Accepts a `FeatureCollection` (its first feature is used), a `Feature`
/// (its geometry is used), or a bare geometry.
///
/// # Errors
///
/// Returns [`GeometryError::Invalid`] if the collection has no features,
/// the geometry is not a `Polygon` or `MultiPolygon`, its coordinates are
/// missing or empty, or the coordinates cannot be parsed.
pub fn normalize(input: &Value) -> Result<NormalizedGeometry, GeometryError> {
    let geometry = unwrap_geometry(input)?;

    let kind = match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => GeometryKind::Polygon,
        Some("MultiPolygon") => GeometryKind::MultiPolygon,
        Some(other) => {
            return Err(GeometryError::invalid(format!(
                "unsupported geometry type '{other}'"
            )));
        }
        None => return Err(GeometryError::invalid("geometry type is missing")),
    };

    match geometry.get("coordinates") {
        Some(Value::Array(coords)) if !coords.is_empty() => {}
        _ => return Err(GeometryError::invalid("geometry coordinates are empty")),
    }

    let parsed = geojson::Geometry::from_json_value(geometry.clone())?;
    let polygons = match geo::Geometry::<f64>::try_from(parsed)? {
        geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        geo::Geometry::MultiPolygon(multi) => multi,
        _ => return Err(GeometryError::invalid("geometry is not polygonal")),
    };

    if polygons.0.is_empty() || polygons.0.iter().any(|p| p.exterior().0.is_empty()) {
        return Err(GeometryError::invalid("geometry has an empty ring"));
    }

    Ok(NormalizedGeometry {
        kind,
        geojson: geometry.clone(),
        polygons,
    })
}

fn unwrap_geometry(input: &Value) -> Result<&Value, GeometryError> {
    match input.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let first = input
                .get("features")
                .and_then(Value::as_array)
                .and_then(|features| features.first())
                .ok_or_else(|| GeometryError::invalid("feature collection has no features"))?;
            unwrap_geometry(first)
        }
        Some("Feature") => input
            .get("geometry")
            .filter(|g| !g.is_null())
            .ok_or_else(|| GeometryError::invalid("feature has no geometry")),
        _ => Ok(input),
    }
}
