//! EPSG:4326 → EPSG:5070 (CONUS Albers equal area) for land cover
//! requests.

use proj4rs::Proj;
use proj4rs::transform::transform;
use terrain_etl_geometry::BoundingBox;

use crate::SourceError;

const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";
const CONUS_ALBERS: &str = "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 \
     +x_0=0 +y_0=0 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs";

/// A bounding box in whole EPSG:5070 metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectedBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl ProjectedBox {
    /// `minx,miny,maxx,maxy`, as the land cover service expects.
    #[must_use]
    pub fn to_query(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// `minx_miny_maxx_maxy`, for cache file names.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.to_query().replace(',', "_")
    }
}

/// Projects a geographic box to CONUS Albers, truncating to whole metres.
///
/// All four corners are projected so the result covers the curved image
/// of the box.
///
/// # Errors
///
/// Returns [`SourceError::Projection`] if a projection cannot be built or
/// a corner fails to transform.
#[allow(clippy::cast_possible_truncation)]
pub fn to_conus_albers(bbox: &BoundingBox) -> Result<ProjectedBox, SourceError> {
    let from = build(WGS84)?;
    let to = build(CONUS_ALBERS)?;

    let corners = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
    ];

    let mut xs = Vec::with_capacity(4);
    let mut ys = Vec::with_capacity(4);
    for (lon, lat) in corners {
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&from, &to, &mut point).map_err(|e| SourceError::Projection {
            message: format!("({lon}, {lat}): {e}"),
        })?;
        xs.push(point.0);
        ys.push(point.1);
    }

    let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(ProjectedBox {
        min_x: min(&xs) as i64,
        min_y: min(&ys) as i64,
        max_x: max(&xs) as i64,
        max_y: max(&ys) as i64,
    })
}

fn build(definition: &str) -> Result<Proj, SourceError> {
    Proj::from_proj_string(definition).map_err(|e| SourceError::Projection {
        message: format!("{definition}: {e}"),
    })
}
