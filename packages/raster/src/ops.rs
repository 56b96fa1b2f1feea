//! Grid alignment operations.

use geo::Rect;
use terrain_etl_terrain_models::{GeoTransform, Grid};

use crate::RasterError;

/// Replaces no-data (and non-finite) cells with `0.0`.
///
/// Cells match the no-data value at `f32` precision: the GDAL tag is
/// printed in decimal and an `f32` raster's sentinel (e.g. `f32::MIN`)
/// does not parse back to the exact widened value.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn replace_nodata(grid: &Grid<f64>, nodata: Option<f64>) -> Grid<f64> {
    let nodata = nodata.map(|n| n as f32);
    grid.map(|&v| {
        let is_nodata = nodata.is_some_and(|n| v as f32 == n);
        if is_nodata || !v.is_finite() { 0.0 } else { v }
    })
}

/// Zero-pads a grid symmetrically to `max(rows, cols)` square.
///
/// The transform is shifted so every original cell keeps its world
/// position. Square grids are returned unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pad_to_square(grid: &Grid<f64>, transform: &GeoTransform) -> (Grid<f64>, GeoTransform) {
    let (rows, cols) = grid.shape();
    if rows == cols {
        return (grid.clone(), *transform);
    }

    let size = rows.max(cols);
    let row_offset = (size - rows) / 2;
    let col_offset = (size - cols) / 2;

    let mut padded = Grid::filled(size, size, 0.0);
    for r in 0..rows {
        for (c, &value) in grid.row(r).iter().enumerate() {
            padded.set(r + row_offset, c + col_offset, value);
        }
    }

    let shifted = transform.translate(-(col_offset as f64), -(row_offset as f64));
    (padded, shifted)
}

/// Crops a grid to `bounds` expanded by `buffer_cells` cells on every
/// side, clamped to the grid.
///
/// # Errors
///
/// Returns [`RasterError::SingularTransform`] if the transform cannot be
/// inverted, or [`RasterError::EmptyWindow`] if the window does not
/// overlap the grid.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn crop_to_bounds<T: Clone>(
    grid: &Grid<T>,
    transform: &GeoTransform,
    bounds: Rect<f64>,
    buffer_cells: f64,
) -> Result<(Grid<T>, GeoTransform), RasterError> {
    let inverse = transform.inverse().ok_or(RasterError::SingularTransform)?;
    let (cell_w, cell_h) = transform.pixel_size();
    let (rows, cols) = grid.shape();

    let min_x = buffer_cells.mul_add(-cell_w, bounds.min().x);
    let max_x = buffer_cells.mul_add(cell_w, bounds.max().x);
    let min_y = buffer_cells.mul_add(-cell_h, bounds.min().y);
    let max_y = buffer_cells.mul_add(cell_h, bounds.max().y);

    let corners = [
        inverse.apply(min_x, min_y),
        inverse.apply(min_x, max_y),
        inverse.apply(max_x, min_y),
        inverse.apply(max_x, max_y),
    ];
    let col_min = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let col_max = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let row_min = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let row_max = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let col_start = col_min.floor().clamp(0.0, cols as f64) as usize;
    let col_end = col_max.ceil().clamp(0.0, cols as f64) as usize;
    let row_start = row_min.floor().clamp(0.0, rows as f64) as usize;
    let row_end = row_max.ceil().clamp(0.0, rows as f64) as usize;

    if col_start >= col_end || row_start >= row_end {
        return Err(RasterError::EmptyWindow);
    }

    let mut cells = Vec::with_capacity((row_end - row_start) * (col_end - col_start));
    for r in row_start..row_end {
        cells.extend_from_slice(&grid.row(r)[col_start..col_end]);
    }
    let cropped = Grid::from_cells(row_end - row_start, col_end - col_start, cells)
        .ok_or(RasterError::EmptyWindow)?;

    Ok((
        cropped,
        transform.translate(col_start as f64, row_start as f64),
    ))
}

/// Nearest-neighbour resample to `rows × cols`.
///
/// Destination index `i` reads source index
/// `round(i / max(dst - 1, 1) · max(src - 1, 0))`, so the first and last
/// rows/columns line up exactly.
///
/// # Errors
///
/// Returns [`RasterError::EmptyGrid`] if the source has no cells.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample_nearest<T: Clone>(
    grid: &Grid<T>,
    rows: usize,
    cols: usize,
) -> Result<Grid<T>, RasterError> {
    if grid.shape() == (rows, cols) {
        return Ok(grid.clone());
    }
    if grid.is_empty() {
        return Err(RasterError::EmptyGrid);
    }

    let map_index = |dst: usize, dst_len: usize, src_len: usize| -> usize {
        let ratio = dst as f64 / dst_len.saturating_sub(1).max(1) as f64;
        let src = (ratio * src_len.saturating_sub(1) as f64).round() as usize;
        src.min(src_len - 1)
    };

    let mut cells = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        let src_row = grid.row(map_index(r, rows, grid.rows()));
        for c in 0..cols {
            cells.push(src_row[map_index(c, cols, grid.cols())].clone());
        }
    }

    Grid::from_cells(rows, cols, cells).ok_or(RasterError::EmptyGrid)
}

/// Minimum and maximum of the finite cells.
#[must_use]
pub fn min_max(grid: &Grid<f64>) -> Option<(f64, f64)> {
    grid.cells()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
