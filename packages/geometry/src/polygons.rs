//! Conversions between stored polygon encodings (WKT, shapefile shapes,
//! `GeoJSON`) and repair of self-intersecting rings.

use geo::{Buffer, Geometry, MultiPolygon, Validation};
use serde_json::Value;
use wkt::TryFromWkt;

use crate::GeometryError;

/// Keeps the polygonal parts of a geometry.
///
/// Returns `None` for points, lines and collections without polygons.
#[must_use]
pub fn polygonal(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons = match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(polygons) => polygons,
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
        Geometry::GeometryCollection(collection) => MultiPolygon::new(
            collection
                .into_iter()
                .filter_map(polygonal)
                .flat_map(|mp| mp.0)
                .collect(),
        ),
        _ => return None,
    };
    (!polygons.0.is_empty()).then_some(polygons)
}

/// Returns the polygons unchanged when valid, otherwise their zero-width
/// buffer, which dissolves self-intersections and fixes ring order.
#[must_use]
pub fn repair(polygons: MultiPolygon<f64>) -> MultiPolygon<f64> {
    if polygons.is_valid() {
        return polygons;
    }
    log::debug!("Repairing invalid polygon with {} part(s)", polygons.0.len());
    polygons.buffer(0.0)
}

/// Parses WKT into polygons.
///
/// # Errors
///
/// Returns [`GeometryError::Invalid`] if the text is not WKT or holds no
/// polygons.
pub fn parse_wkt_polygons(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geometry = Geometry::<f64>::try_from_wkt_str(text)
        .map_err(|e| GeometryError::invalid(format!("unparseable WKT: {e}")))?;
    polygonal(geometry).ok_or_else(|| GeometryError::invalid("WKT holds no polygons"))
}

/// Encodes polygons as a bare `GeoJSON` `MultiPolygon` geometry.
///
/// # Errors
///
/// Returns [`GeometryError::Invalid`] if serialization fails.
pub fn to_geojson(polygons: &MultiPolygon<f64>) -> Result<Value, GeometryError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(polygons));
    serde_json::to_value(&geometry).map_err(|e| GeometryError::invalid(e.to_string()))
}
