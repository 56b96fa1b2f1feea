//! Single-band `GeoTIFF` reading and writing.
//!
//! Georeferencing comes from `ModelTransformationTag` when present,
//! otherwise from `ModelTiepointTag` + `ModelPixelScaleTag`. The no-data
//! value is read from the GDAL ASCII tag.

use std::io::Cursor;

use terrain_etl_terrain_models::{GeoTransform, Grid};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::RasterError;

const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

/// Decoding buffers are capped at 512 MB.
const DECODE_LIMIT_BYTES: usize = 512 * 1024 * 1024;

/// The first band of a decoded `GeoTIFF`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRaster {
    pub grid: Grid<f64>,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
}

/// Decodes the first band of an in-memory `GeoTIFF`.
///
/// # Errors
///
/// Returns [`RasterError`] if the bytes are not a readable TIFF or carry
/// no georeferencing.
pub fn decode(bytes: &[u8]) -> Result<DecodedRaster, RasterError> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = DECODE_LIMIT_BYTES;
    limits.intermediate_buffer_size = DECODE_LIMIT_BYTES;
    limits.ifd_value_size = DECODE_LIMIT_BYTES;

    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(limits);
    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);

    let transform = read_transform(&mut decoder)?;
    let nodata = decoder
        .get_tag_ascii_string(GDAL_NODATA)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

    let samples = decode_samples(decoder.read_image()?);
    let pixels = rows * cols;
    if pixels == 0 || samples.len() < pixels {
        return Err(RasterError::Shape {
            message: format!("{} samples for a {rows}x{cols} image", samples.len()),
        });
    }

    let band_count = samples.len() / pixels;
    let cells = if band_count == 1 {
        samples
    } else {
        samples.into_iter().step_by(band_count).take(pixels).collect()
    };

    let grid = Grid::from_cells(rows, cols, cells).ok_or_else(|| RasterError::Shape {
        message: format!("cannot shape band into {rows}x{cols}"),
    })?;

    log::debug!("Decoded {rows}x{cols} GeoTIFF ({band_count} band(s), nodata={nodata:?})");

    Ok(DecodedRaster {
        grid,
        transform,
        nodata,
    })
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform, RasterError> {
    if let Ok(m) = decoder.get_tag_f64_vec(MODEL_TRANSFORMATION) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from([m[0], m[1], m[3], m[4], m[5], m[7]]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT);
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE);

    match (tiepoint, scale) {
        (Ok(tie), Ok(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint is [i, j, k, x, y, z]: raster (i, j) maps to world (x, y).
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            let (sx, sy) = (scale[0], scale[1]);
            Ok(GeoTransform::from_origin(
                sx.mul_add(-i, x),
                sy.mul_add(j, y),
                sx,
                sy,
            ))
        }
        _ => Err(RasterError::Georeferencing {
            message: "missing ModelTransformation or ModelTiepoint/ModelPixelScale tags"
                .to_string(),
        }),
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_samples(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}

/// Encodes a grid as a single-band 64-bit float `GeoTIFF`.
///
/// # Errors
///
/// Returns [`RasterError`] if the transform is rotated (only north-up
/// grids can be described with tiepoint + pixel scale) or encoding fails.
pub fn encode(
    grid: &Grid<f64>,
    transform: &GeoTransform,
    nodata: Option<f64>,
) -> Result<Vec<u8>, RasterError> {
    if transform.b != 0.0 || transform.d != 0.0 {
        return Err(RasterError::Georeferencing {
            message: "rotated transforms cannot be written".to_string(),
        });
    }
    let width = u32::try_from(grid.cols()).map_err(|_| RasterError::Shape {
        message: format!("{} columns", grid.cols()),
    })?;
    let height = u32::try_from(grid.rows()).map_err(|_| RasterError::Shape {
        message: format!("{} rows", grid.rows()),
    })?;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut image = encoder.new_image::<colortype::Gray64Float>(width, height)?;
        image.encoder().write_tag(
            MODEL_PIXEL_SCALE,
            &[transform.a, -transform.e, 0.0][..],
        )?;
        image.encoder().write_tag(
            MODEL_TIEPOINT,
            &[0.0, 0.0, 0.0, transform.c, transform.f, 0.0][..],
        )?;
        if let Some(nodata) = nodata {
            image
                .encoder()
                .write_tag(GDAL_NODATA, nodata.to_string().as_str())?;
        }
        image.write_data(grid.cells())?;
    }

    Ok(buffer.into_inner())
}
