//! `GeoTIFF` export and status rendering of stored layers.

use std::fmt::Write as _;

use terrain_etl_terrain_models::{GeoTransform, Grid, LayerName, LayerStatus, TerrainDocument};

/// The stored grid of `layer` as `f64` cells, with its transform.
#[must_use]
pub fn layer_raster(
    terrain: &TerrainDocument,
    layer: LayerName,
) -> Option<(Grid<f64>, GeoTransform)> {
    match layer {
        LayerName::Dem => terrain
            .usable_elevation()
            .map(|elevation| (elevation.heightmap.clone(), elevation.transform)),
        LayerName::Soil => {
            let soil = terrain.soil_data.as_ref()?;
            let grid = soil.grid.as_ref()?;
            Some((grid.map(|&id| f64::from(id)), soil.transform?))
        }
        LayerName::LandCover => {
            let land_cover = terrain.land_cover.as_ref()?;
            Some((
                land_cover.grid.map(|&code| f64::from(code)),
                land_cover.transform?,
            ))
        }
    }
}

fn status_line(out: &mut String, name: &str, status: Option<&LayerStatus>) {
    let Some(status) = status else {
        let _ = writeln!(out, "{name:<12} -");
        return;
    };
    let _ = write!(
        out,
        "{name:<12} {:<7} {}",
        status.status.to_string(),
        status.updated_at.to_rfc3339()
    );
    if let Some(note) = &status.note {
        let _ = write!(out, " note={note}");
    }
    if let Some(error) = &status.error {
        let _ = write!(out, " error={error}");
    }
    out.push('\n');
}

/// One line per layer plus the last pipeline outcome.
#[must_use]
pub fn render_status(terrain: &TerrainDocument) -> String {
    let mut out = String::new();
    if let Some(region) = &terrain.region {
        let _ = writeln!(
            out,
            "region       {} / {}",
            region.country.as_deref().unwrap_or("-"),
            region.subdivision_name.as_deref().unwrap_or("-")
        );
    }
    for layer in [LayerName::Dem, LayerName::Soil, LayerName::LandCover] {
        status_line(&mut out, layer.key(), terrain.layer_status(layer));
    }
    status_line(&mut out, "pipeline", terrain.pipeline.as_ref());
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use terrain_etl_terrain_models::{GridBounds, LandCoverData, Region, SoilData};

    use super::*;

    fn terrain() -> TerrainDocument {
        let transform = GeoTransform::from_origin(-94.0, 42.0, 0.5, 0.5);
        let mut terrain = TerrainDocument {
            project_id: "p1".to_string(),
            region: Some(Region {
                country: Some("USA".to_string()),
                subdivision_name: Some("Polk".to_string()),
                ..Region::default()
            }),
            ..TerrainDocument::default()
        };
        terrain.soil_data = Some(SoilData {
            source: "USDA_SSURGO".to_string(),
            map_units: Vec::new(),
            units: BTreeMap::new(),
            index_map: BTreeMap::new(),
            grid: Some(Grid::from_cells(1, 2, vec![1, 2]).unwrap()),
            bounds: Some(GridBounds::from_transform(1, 2, &transform)),
            transform: Some(transform),
            fetched_at: Utc::now(),
        });
        terrain.land_cover = Some(LandCoverData {
            source: "USDA_CDL".to_string(),
            year: 2023,
            grid: Grid::from_cells(1, 2, vec![5, 1]).unwrap(),
            index_map: BTreeMap::new(),
            units: BTreeMap::new(),
            bounds: None,
            transform: None,
            fetched_at: Utc::now(),
        });
        terrain
            .etl_layers
            .insert("soil".to_string(), LayerStatus::ok(Utc::now()));
        terrain.etl_layers.insert(
            "land_cover".to_string(),
            LayerStatus::failed("HTTP 502", Utc::now()),
        );
        terrain
    }

    #[test]
    fn soil_grid_exports_as_f64() {
        let (grid, transform) = layer_raster(&terrain(), LayerName::Soil).unwrap();
        assert_eq!(grid.cells(), &[1.0, 2.0]);
        assert_eq!(transform, GeoTransform::from_origin(-94.0, 42.0, 0.5, 0.5));
    }

    #[test]
    fn layers_without_grid_or_transform_are_not_exportable() {
        let terrain = terrain();
        assert!(layer_raster(&terrain, LayerName::Dem).is_none());
        assert!(layer_raster(&terrain, LayerName::LandCover).is_none());
    }

    #[test]
    fn status_lists_every_layer() {
        let rendered = render_status(&terrain());
        assert!(rendered.starts_with("region       USA / Polk\n"));
        assert!(rendered.contains("dem          -\n"));
        assert!(rendered.contains("soil         ok"));
        assert!(rendered.contains("land_cover   failed"));
        assert!(rendered.contains("error=HTTP 502"));
        assert!(rendered.contains("pipeline     -\n"));
    }
}
