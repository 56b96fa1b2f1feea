//! Buffered square bounding boxes for elevation requests.

use geo::Rect;
use serde::{Deserialize, Serialize};

/// How much context to add around a geometry before requesting tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferPolicy {
    /// Fraction of the longer side added to the box.
    pub ratio: f64,
    /// Minimum buffer (and minimum side length) in degrees.
    pub min_buffer_deg: f64,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            ratio: 0.1,
            min_buffer_deg: 0.002,
        }
    }
}

/// An axis-aligned box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[must_use]
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Builds a square box centered on `bounds`.
    ///
    /// The side is the largest of the buffered span, the span plus the
    /// minimum buffer, and the minimum buffer itself, so degenerate
    /// (point-like) inputs still produce a usable box.
    #[must_use]
    pub fn square_around(bounds: Rect<f64>, policy: BufferPolicy) -> Self {
        let span = bounds.width().max(bounds.height());
        let side = (span * (1.0 + policy.ratio))
            .max(span + policy.min_buffer_deg)
            .max(policy.min_buffer_deg);
        let half = side / 2.0;
        let center = bounds.center();

        Self::new(
            center.x - half,
            center.y - half,
            center.x + half,
            center.y + half,
        )
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Filename-safe key: coordinates to four decimals, `.` replaced with
    /// `_` and `-` with `m`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .map(|v| format!("{v:.4}").replace('.', "_").replace('-', "m"))
            .collect::<Vec<_>>()
            .join("_")
    }
}
