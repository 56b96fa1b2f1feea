//! Boundary shapefiles: archive extraction and attribute/geometry reading.
//!
//! These are blocking filesystem operations; async callers run them on
//! the blocking pool.

use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use shapefile::dbase::{FieldValue, Record};

use crate::GeoError;

/// One boundary polygon with its code and name.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub code: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Code used when none of the configured attributes holds a value.
pub const UNKNOWN_CODE: &str = "UNK";
/// Name used when none of the configured attributes holds a value.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Extracts a zip archive into `target_dir`.
///
/// # Errors
///
/// Returns [`GeoError`] if the archive cannot be opened or extracted.
pub fn extract_archive(archive: &Path, target_dir: &Path) -> Result<(), GeoError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    std::fs::create_dir_all(target_dir)?;
    zip.extract(target_dir)?;
    log::debug!(
        "Extracted {} entries from {} into {}",
        zip.len(),
        archive.display(),
        target_dir.display()
    );
    Ok(())
}

/// Finds the first `.shp` file (by name) under `dir`, descending into
/// subdirectories.
///
/// # Errors
///
/// Returns [`GeoError::Conversion`] if there is none.
pub fn find_shapefile(dir: &Path) -> Result<PathBuf, GeoError> {
    let mut pending = vec![dir.to_path_buf()];
    let mut found = Vec::new();

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    found.into_iter().next().ok_or_else(|| GeoError::Conversion {
        message: format!("No .shp file found in {}", dir.display()),
    })
}

/// Reads every polygonal shape in a shapefile.
///
/// Empty or non-polygonal shapes are skipped; invalid polygons are
/// repaired with a zero-width buffer.
///
/// # Errors
///
/// Returns [`GeoError::Shapefile`] if the file cannot be read.
pub fn read_boundaries(
    path: &Path,
    code_fields: &[String],
    name_fields: &[String],
) -> Result<Vec<Boundary>, GeoError> {
    let mut reader = shapefile::Reader::from_path(path)?;
    let mut boundaries = Vec::new();
    let mut skipped = 0_usize;

    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item?;

        let Some(polygons) = geo::Geometry::<f64>::try_from(shape)
            .ok()
            .and_then(terrain_etl_geometry::polygonal)
        else {
            skipped += 1;
            continue;
        };
        let geometry = terrain_etl_geometry::repair(polygons);
        if geometry.0.is_empty() {
            skipped += 1;
            continue;
        }

        boundaries.push(Boundary {
            code: first_attribute(&record, code_fields).unwrap_or_else(|| UNKNOWN_CODE.to_string()),
            name: first_attribute(&record, name_fields).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            geometry,
        });
    }

    log::info!(
        "Read {} boundaries from {} ({skipped} skipped)",
        boundaries.len(),
        path.display()
    );
    Ok(boundaries)
}

/// The first non-empty attribute among `fields`.
fn first_attribute(record: &Record, fields: &[String]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| record.get(field).and_then(field_text))
}

fn field_text(value: &FieldValue) -> Option<String> {
    let text = match value {
        FieldValue::Character(Some(s)) => s.trim().to_string(),
        FieldValue::Memo(s) => s.trim().to_string(),
        FieldValue::Numeric(Some(n)) => format_number(*n),
        FieldValue::Integer(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
