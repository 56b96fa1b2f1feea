//! Geodesic area on the WGS84 ellipsoid.

use geo::{GeodesicArea, MultiPolygon};
use serde_json::Value;

use crate::{GeometryError, normalize};

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Computes the area of a submitted geometry in hectares.
///
/// # Errors
///
/// Returns [`GeometryError`] if the geometry cannot be normalized.
pub fn compute_area_hectares(input: &Value) -> Result<f64, GeometryError> {
    let geometry = normalize(input)?;
    Ok(area_hectares(geometry.polygons()))
}

/// Sums the absolute signed geodesic area of each part, in hectares.
///
/// Taking the absolute value per part makes the result independent of
/// ring winding. Holes are subtracted from their exterior.
#[must_use]
pub fn area_hectares(polygons: &MultiPolygon<f64>) -> f64 {
    let square_meters: f64 = polygons
        .0
        .iter()
        .map(|polygon| polygon.geodesic_area_signed().abs())
        .sum();

    square_meters / SQUARE_METERS_PER_HECTARE
}
