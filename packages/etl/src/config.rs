//! Runtime configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `TERRAIN_DATA_DIR` | `<workspace>/data` |
//! | `TERRAIN_STORE` | `duckdb` (`memory` for an ephemeral store) |
//! | `TERRAIN_DB_PATH` | `<data>/terrain.duckdb` |
//! | `OPENTOPO_API_KEY` | empty (DEM fetches fail until set) |
//! | `OPENTOPO_DEM` | `SRTMGL3` |
//! | `ETL_HTTP_TIMEOUT_SECS` | `180` |
//! | `ETL_WORKERS` | `4` |
//! | `ETL_QUEUE_CAPACITY` | `64` |
//! | `ETL_DEM_CROP` | `1` |
//! | `LAND_COVER_REMOTE_ONLY` | unset (`1` disables the soil fallback) |
//! | `LAND_COVER_FORCE_ERROR_ONCE` | unset (`1` fails the first land cover fetch) |
//! | `TERRAIN_COUNTRIES` | `USA` |

use std::path::PathBuf;
use std::time::Duration;

use terrain_etl_database::paths;

/// Where terrain and reference documents are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    DuckDb(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlConfig {
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub opentopo_api_key: String,
    pub dem_type: String,
    pub http_timeout: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
    pub crop_dem: bool,
    pub allow_land_cover_fallback: bool,
    pub force_land_cover_error_once: bool,
    /// Countries whose datasets are initialized at startup.
    pub countries: Vec<String>,
}

impl EtlConfig {
    /// Reads the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Unparseable
    /// numbers fall back to their defaults with a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = var("TERRAIN_DATA_DIR").map_or_else(paths::default_data_dir, PathBuf::from);
        let store = if var("TERRAIN_STORE").is_some_and(|s| s.eq_ignore_ascii_case("memory")) {
            StoreConfig::Memory
        } else {
            StoreConfig::DuckDb(
                var("TERRAIN_DB_PATH")
                    .map_or_else(|| data_dir.join("terrain.duckdb"), PathBuf::from),
            )
        };

        let number = |name: &str, default: u64| -> u64 {
            var(name).map_or(default, |raw| {
                raw.parse().unwrap_or_else(|_| {
                    log::warn!("Ignoring {name}={raw}: not a number, using {default}");
                    default
                })
            })
        };
        let flag =
            |name: &str| var(name).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let countries = var("TERRAIN_COUNTRIES").map_or_else(
            || vec!["USA".to_string()],
            |raw| {
                raw.split(',')
                    .map(|c| c.trim().to_ascii_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            },
        );

        Self {
            store,
            opentopo_api_key: var("OPENTOPO_API_KEY").unwrap_or_default(),
            dem_type: var("OPENTOPO_DEM").unwrap_or_else(|| "SRTMGL3".to_string()),
            http_timeout: Duration::from_secs(number("ETL_HTTP_TIMEOUT_SECS", 180).max(1)),
            workers: usize::try_from(number("ETL_WORKERS", 4)).unwrap_or(4).max(1),
            queue_capacity: usize::try_from(number("ETL_QUEUE_CAPACITY", 64))
                .unwrap_or(64)
                .max(1),
            crop_dem: var("ETL_DEM_CROP").is_none_or(|v| v != "0"),
            allow_land_cover_fallback: !flag("LAND_COVER_REMOTE_ONLY"),
            force_land_cover_error_once: flag("LAND_COVER_FORCE_ERROR_ONCE"),
            countries,
            data_dir,
        }
    }

    #[must_use]
    pub fn dem_cache_dir(&self) -> PathBuf {
        self.data_dir.join("dem_cache")
    }

    #[must_use]
    pub fn land_cover_cache_dir(&self) -> PathBuf {
        self.data_dir.join("land_cover_cache")
    }

    #[must_use]
    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir.join("datasets")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> EtlConfig {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EtlConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("TERRAIN_DATA_DIR", "/tmp/terrain")]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/terrain"));
        assert_eq!(
            config.store,
            StoreConfig::DuckDb(PathBuf::from("/tmp/terrain/terrain.duckdb"))
        );
        assert_eq!(config.dem_type, "SRTMGL3");
        assert!(config.opentopo_api_key.is_empty());
        assert_eq!(config.http_timeout, Duration::from_secs(180));
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 64);
        assert!(config.crop_dem);
        assert!(config.allow_land_cover_fallback);
        assert!(!config.force_land_cover_error_once);
        assert_eq!(config.countries, ["USA"]);
        assert_eq!(config.dem_cache_dir(), PathBuf::from("/tmp/terrain/dem_cache"));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("TERRAIN_DATA_DIR", "/data"),
            ("TERRAIN_STORE", "memory"),
            ("OPENTOPO_API_KEY", "secret"),
            ("ETL_WORKERS", "2"),
            ("ETL_HTTP_TIMEOUT_SECS", "30"),
            ("ETL_DEM_CROP", "0"),
            ("LAND_COVER_REMOTE_ONLY", "1"),
            ("LAND_COVER_FORCE_ERROR_ONCE", "true"),
            ("TERRAIN_COUNTRIES", "usa, can,"),
        ]);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.opentopo_api_key, "secret");
        assert_eq!(config.workers, 2);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(!config.crop_dem);
        assert!(!config.allow_land_cover_fallback);
        assert!(config.force_land_cover_error_once);
        assert_eq!(config.countries, ["USA", "CAN"]);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = config(&[
            ("TERRAIN_DATA_DIR", "/d"),
            ("ETL_WORKERS", "many"),
            ("ETL_QUEUE_CAPACITY", "0"),
        ]);
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 1);
    }
}
