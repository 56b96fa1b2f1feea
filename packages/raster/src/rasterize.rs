//! Polygon → grid burning.

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use terrain_etl_terrain_models::{GeoTransform, Grid};

use crate::RasterError;

/// Burns `(polygon, value)` pairs onto a `rows × cols` grid.
///
/// A cell takes a shape's value when the cell center lies inside the
/// shape. Later shapes overwrite earlier ones; untouched cells keep
/// `fill`.
///
/// # Errors
///
/// Returns [`RasterError::SingularTransform`] if the transform cannot be
/// inverted.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn rasterize(
    shapes: &[(MultiPolygon<f64>, i32)],
    rows: usize,
    cols: usize,
    transform: &GeoTransform,
    fill: i32,
) -> Result<Grid<i32>, RasterError> {
    let inverse = transform.inverse().ok_or(RasterError::SingularTransform)?;
    let mut grid = Grid::filled(rows, cols, fill);

    for (shape, value) in shapes {
        let Some(rect) = shape.bounding_rect() else {
            continue;
        };

        let corners = [
            inverse.apply(rect.min().x, rect.min().y),
            inverse.apply(rect.min().x, rect.max().y),
            inverse.apply(rect.max().x, rect.min().y),
            inverse.apply(rect.max().x, rect.max().y),
        ];
        let col_min = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let col_max = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let row_min = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let row_max = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let col_start = col_min.floor().clamp(0.0, cols as f64) as usize;
        let col_end = col_max.ceil().clamp(0.0, cols as f64) as usize;
        let row_start = row_min.floor().clamp(0.0, rows as f64) as usize;
        let row_end = row_max.ceil().clamp(0.0, rows as f64) as usize;

        for r in row_start..row_end {
            for c in col_start..col_end {
                let (x, y) = transform.apply(c as f64 + 0.5, r as f64 + 0.5);
                if shape.contains(&Point::new(x, y)) {
                    grid.set(r, c, *value);
                }
            }
        }
    }

    Ok(grid)
}
