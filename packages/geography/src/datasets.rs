//! Reference dataset definitions, loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/geography/datasets/` is baked into the
//! binary with [`include_str!`]. Supporting subdivisions for another
//! country means adding a TOML file and listing it below.

use serde::Deserialize;

use crate::GeoError;

/// TOML configs embedded at compile time.
const DATASET_TOMLS: &[(&str, &str)] = &[
    ("countries", include_str!("../datasets/countries.toml")),
    (
        "subdivisions_usa",
        include_str!("../datasets/subdivisions_usa.toml"),
    ),
];

/// Which collection a dataset feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Countries,
    Subdivisions,
}

fn default_interval_days() -> u32 {
    365
}

/// A downloadable boundary dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDefinition {
    /// Name recorded in `datasets` and `refresh_jobs`.
    pub name: String,
    pub kind: DatasetKind,
    /// Parent country for subdivision datasets.
    #[serde(default)]
    pub country: Option<String>,
    /// Administrative level, informational only.
    #[serde(default)]
    pub level: Option<String>,
    /// Zipped shapefile URL.
    pub url: String,
    /// File name of the archive in the datasets directory.
    pub archive: String,
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,
    /// Attribute names tried in order for the boundary code.
    pub code_fields: Vec<String>,
    /// Attribute names tried in order for the boundary name.
    pub name_fields: Vec<String>,
}

impl DatasetDefinition {
    /// Directory name the archive is extracted into.
    #[must_use]
    pub fn extract_dir_name(&self) -> &str {
        self.archive.strip_suffix(".zip").unwrap_or(&self.archive)
    }
}

/// Parses a single dataset TOML document.
///
/// # Errors
///
/// Returns [`GeoError::Config`] if the TOML is malformed.
pub fn parse_dataset_toml(toml_str: &str) -> Result<DatasetDefinition, GeoError> {
    toml::de::from_str(toml_str).map_err(|e| GeoError::Config {
        message: e.to_string(),
    })
}

/// Returns every configured dataset.
///
/// # Errors
///
/// Returns [`GeoError::Config`] naming the first malformed config.
pub fn all_datasets() -> Result<Vec<DatasetDefinition>, GeoError> {
    DATASET_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_dataset_toml(toml).map_err(|e| GeoError::Config {
                message: format!("{name}.toml: {e}"),
            })
        })
        .collect()
}

/// The country boundary dataset.
///
/// # Errors
///
/// Returns [`GeoError::Config`] if the configs are malformed or none
/// defines countries.
pub fn countries() -> Result<DatasetDefinition, GeoError> {
    all_datasets()?
        .into_iter()
        .find(|d| d.kind == DatasetKind::Countries)
        .ok_or_else(|| GeoError::Config {
            message: "no countries dataset configured".to_string(),
        })
}

/// The subdivision dataset for a country code, if one is configured.
///
/// # Errors
///
/// Returns [`GeoError::Config`] if the configs are malformed.
pub fn subdivisions_for(country: &str) -> Result<Option<DatasetDefinition>, GeoError> {
    Ok(all_datasets()?.into_iter().find(|d| {
        d.kind == DatasetKind::Subdivisions
            && d.country
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(country))
    }))
}

/// Country codes that have a subdivision dataset.
///
/// # Errors
///
/// Returns [`GeoError::Config`] if the configs are malformed.
pub fn subdivision_countries() -> Result<Vec<String>, GeoError> {
    Ok(all_datasets()?
        .into_iter()
        .filter(|d| d.kind == DatasetKind::Subdivisions)
        .filter_map(|d| d.country)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_datasets() {
        let datasets = all_datasets().unwrap();
        assert_eq!(datasets.len(), DATASET_TOMLS.len());
        for dataset in &datasets {
            assert!(!dataset.url.is_empty(), "{}: url is empty", dataset.name);
            assert!(!dataset.code_fields.is_empty(), "{}: no code fields", dataset.name);
            assert!(!dataset.name_fields.is_empty(), "{}: no name fields", dataset.name);
            assert_eq!(dataset.interval_days, 365);
        }
    }

    #[test]
    fn countries_dataset_prefers_adm0_code() {
        let countries = countries().unwrap();
        assert_eq!(countries.name, "countries");
        assert_eq!(countries.code_fields[0], "ADM0_A3");
        assert_eq!(countries.extract_dir_name(), "countries");
    }

    #[test]
    fn usa_subdivisions_are_counties() {
        let usa = subdivisions_for("usa").unwrap().unwrap();
        assert_eq!(usa.name, "subdivisions_USA");
        assert_eq!(usa.level.as_deref(), Some("county"));
        assert_eq!(usa.code_fields, ["GEOID", "AFFGEOID", "ID"]);
        assert!(subdivisions_for("FRA").unwrap().is_none());
        assert_eq!(subdivision_countries().unwrap(), ["USA"]);
    }

    #[test]
    fn interval_defaults_to_a_year() {
        let parsed = parse_dataset_toml(
            r#"
            name = "x"
            kind = "countries"
            url = "http://example.invalid/x.zip"
            archive = "x.zip"
            code_fields = ["A"]
            name_fields = ["B"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.interval_days, 365);
        assert!(parsed.country.is_none());
    }
}
