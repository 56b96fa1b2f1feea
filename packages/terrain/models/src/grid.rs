//! Georeferenced raster grids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dense row-major grid.
///
/// Serialized as a list of rows so stored documents read naturally
/// (`heightmap[row][col]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<T>>", into = "Vec<Vec<T>>")]
#[serde(bound(serialize = "T: Clone + Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Creates a `rows × cols` grid filled with `fill`.
    #[must_use]
    pub fn filled(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![fill; rows * cols],
        }
    }
}

impl<T> Grid<T> {
    /// Wraps row-major cells, returning `None` if the length does not match.
    #[must_use]
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<T>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Overwrites one cell. Out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = value;
        }
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.cols;
        &self.cells[start..start + self.cols]
    }

    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    #[must_use]
    pub fn into_cells(self) -> Vec<T> {
        self.cells
    }

    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}

/// A nested row list whose rows differ in length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaggedRowsError {
    pub row: usize,
}

impl fmt::Display for RaggedRowsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid row {} has a different length than row 0", self.row)
    }
}

impl std::error::Error for RaggedRowsError {}

impl<T> TryFrom<Vec<Vec<T>>> for Grid<T> {
    type Error = RaggedRowsError;

    fn try_from(rows: Vec<Vec<T>>) -> Result<Self, Self::Error> {
        let row_count = rows.len();
        let cols = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(row_count * cols);

        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(RaggedRowsError { row: index });
            }
            cells.extend(row);
        }

        Ok(Self {
            rows: row_count,
            cols,
            cells,
        })
    }
}

impl<T> From<Grid<T>> for Vec<Vec<T>> {
    fn from(grid: Grid<T>) -> Self {
        if grid.cols == 0 {
            return (0..grid.rows).map(|_| Vec::new()).collect();
        }
        let mut rows = Vec::with_capacity(grid.rows);
        let mut cells = grid.cells.into_iter();
        for _ in 0..grid.rows {
            rows.push(cells.by_ref().take(grid.cols).collect());
        }
        rows
    }
}

/// Affine pixel → world transform.
///
/// `x = a·col + b·row + c`, `y = d·col + e·row + f`. Stored as the six
/// coefficients `[a, b, c, d, e, f]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform with the top-left corner at `(west, north)`.
    #[must_use]
    pub const fn from_origin(west: f64, north: f64, x_size: f64, y_size: f64) -> Self {
        Self {
            a: x_size,
            b: 0.0,
            c: west,
            d: 0.0,
            e: -y_size,
            f: north,
        }
    }

    /// World coordinates of pixel corner `(col, row)`.
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a.mul_add(col, self.b.mul_add(row, self.c)),
            self.d.mul_add(col, self.e.mul_add(row, self.f)),
        )
    }

    /// This transform composed with a pixel translation, so that pixel
    /// `(0, 0)` of the result is pixel `(col_offset, row_offset)` of `self`.
    #[must_use]
    pub fn translate(&self, col_offset: f64, row_offset: f64) -> Self {
        let (c, f) = self.apply(col_offset, row_offset);
        Self { c, f, ..*self }
    }

    /// World → pixel transform, or `None` when the matrix is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a.mul_add(self.e, -(self.b * self.d));
        if det.abs() < f64::EPSILON * 1e-6 || !det.is_finite() {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -a.mul_add(self.c, b * self.f),
            d,
            e,
            f: -d.mul_add(self.c, e * self.f),
        })
    }

    /// Absolute pixel width and height.
    #[must_use]
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from([a, b, c, d, e, f]: [f64; 6]) -> Self {
        Self { a, b, c, d, e, f }
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(t: GeoTransform) -> Self {
        [t.a, t.b, t.c, t.d, t.e, t.f]
    }
}

/// World-space extent of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl GridBounds {
    /// Extent covered by a `rows × cols` grid under `transform`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_transform(rows: usize, cols: usize, transform: &GeoTransform) -> Self {
        let corners = [
            transform.apply(0.0, 0.0),
            transform.apply(cols as f64, 0.0),
            transform.apply(0.0, rows as f64),
            transform.apply(cols as f64, rows as f64),
        ];

        let mut bounds = Self {
            left: f64::INFINITY,
            bottom: f64::INFINITY,
            right: f64::NEG_INFINITY,
            top: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.bottom = bounds.bottom.min(y);
            bounds.top = bounds.top.max(y);
        }
        bounds
    }
}
