//! Per-country layer ETLs and the registry that dispatches to them.

pub mod usa;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use terrain_etl_terrain_models::{LayerName, ProjectRef};

use crate::{EtlError, LayerOutcome};

pub use usa::UsaEtl;

/// The layer ETLs available for one country.
#[async_trait]
pub trait CountryEtl: Send + Sync {
    /// ISO 3166-1 alpha-3 code.
    fn code(&self) -> &str;

    /// Layers run after the DEM, in order.
    fn layers(&self) -> &[LayerName];

    /// Loads the reference data the layers need.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError`] if a dataset cannot be loaded.
    async fn initialize(&self) -> Result<(), EtlError>;

    /// Runs one layer for a project.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::UnsupportedLayer`] for a layer not in
    /// [`Self::layers`], otherwise whatever the layer ETL returns.
    async fn run_layer(
        &self,
        layer: LayerName,
        project: &ProjectRef,
    ) -> Result<LayerOutcome, EtlError>;
}

/// Country code → layer ETLs, filled at startup.
#[derive(Clone, Default)]
pub struct CountryRegistry {
    countries: BTreeMap<String, Arc<dyn CountryEtl>>,
}

impl CountryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `etl` under its uppercased code, replacing any previous
    /// entry.
    pub fn register(&mut self, etl: Arc<dyn CountryEtl>) {
        let code = etl.code().to_ascii_uppercase();
        log::debug!("Registered country ETL {code} ({:?})", etl.layers());
        self.countries.insert(code, etl);
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Arc<dyn CountryEtl>> {
        self.countries.get(&code.trim().to_ascii_uppercase())
    }

    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.countries.keys().map(String::as_str).collect()
    }

    fn require(&self, code: &str) -> Result<&Arc<dyn CountryEtl>, EtlError> {
        self.get(code).ok_or_else(|| EtlError::UnsupportedRegion {
            code: code.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns [`EtlError::UnsupportedRegion`] for an unregistered code.
    pub fn layers(&self, code: &str) -> Result<Vec<LayerName>, EtlError> {
        Ok(self.require(code)?.layers().to_vec())
    }

    /// Runs every layer of the country in order, stopping at the first
    /// error. Contained failures come back as failed outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::UnsupportedRegion`] for an unregistered code,
    /// or the first error a layer returns.
    pub async fn run_all(
        &self,
        code: &str,
        project: &ProjectRef,
    ) -> Result<Vec<LayerOutcome>, EtlError> {
        let etl = self.require(code)?;
        let mut outcomes = Vec::with_capacity(etl.layers().len());
        for &layer in etl.layers() {
            log::info!(
                "Running {} {layer} ETL for project {}",
                etl.code(),
                project.project_id
            );
            outcomes.push(etl.run_layer(layer, project).await?);
        }
        Ok(outcomes)
    }

    /// Runs one layer named by `layer` (`soil`, `land_cover`, `landcover`,
    /// `land-cover`).
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::UnsupportedRegion`] for an unregistered code,
    /// [`EtlError::UnsupportedLayer`] for a name the country does not run,
    /// or the layer's own error.
    pub async fn run_layer(
        &self,
        code: &str,
        layer: &str,
        project: &ProjectRef,
    ) -> Result<LayerOutcome, EtlError> {
        let etl = self.require(code)?;
        let unsupported = || EtlError::UnsupportedLayer {
            country: etl.code().to_string(),
            layer: layer.to_string(),
        };
        let parsed = LayerName::from_str(layer.trim()).map_err(|_| unsupported())?;
        if !etl.layers().contains(&parsed) {
            return Err(unsupported());
        }
        etl.run_layer(parsed, project).await
    }

    /// # Errors
    ///
    /// Returns [`EtlError::UnsupportedRegion`] for an unregistered code,
    /// or the country's initialization error.
    pub async fn initialize(&self, code: &str) -> Result<(), EtlError> {
        self.require(code)?.initialize().await
    }

    /// Initializes each listed country. Failures are logged and the
    /// remaining countries still run.
    pub async fn initialize_configured(&self, codes: &[String]) {
        for code in codes {
            match self.initialize(code).await {
                Ok(()) => log::info!("Initialized country {code}"),
                Err(e) => log::error!("Country {code} initialization failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;
    use terrain_etl_terrain_models::LayerStatus;

    use super::*;

    /// Records the layers it runs; `fail` makes that layer return an error.
    pub(crate) struct Scripted {
        pub(crate) code: &'static str,
        pub(crate) fail: Option<LayerName>,
        pub(crate) ran: Mutex<Vec<LayerName>>,
    }

    impl Scripted {
        pub(crate) fn new(code: &'static str, fail: Option<LayerName>) -> Self {
            Self {
                code,
                fail,
                ran: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CountryEtl for Scripted {
        fn code(&self) -> &str {
            self.code
        }

        fn layers(&self) -> &[LayerName] {
            &[LayerName::Soil, LayerName::LandCover]
        }

        async fn initialize(&self) -> Result<(), EtlError> {
            if self.fail.is_some() {
                return Err(EtlError::missing("init"));
            }
            Ok(())
        }

        async fn run_layer(
            &self,
            layer: LayerName,
            _project: &ProjectRef,
        ) -> Result<LayerOutcome, EtlError> {
            self.ran.lock().unwrap().push(layer);
            if self.fail == Some(layer) {
                return Err(EtlError::missing(format!("{layer} broke")));
            }
            Ok(LayerOutcome::new(layer, LayerStatus::ok(Utc::now()), 1))
        }
    }

    fn project() -> ProjectRef {
        ProjectRef {
            project_id: "p1".to_string(),
            geometry: json!({}),
        }
    }

    #[tokio::test]
    async fn runs_layers_in_order_with_case_insensitive_code() {
        let usa = Arc::new(Scripted::new("USA", None));
        let mut registry = CountryRegistry::new();
        registry.register(usa.clone());

        let outcomes = registry.run_all("usa", &project()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(*usa.ran.lock().unwrap(), [LayerName::Soil, LayerName::LandCover]);
        assert_eq!(registry.codes(), ["USA"]);
    }

    #[tokio::test]
    async fn first_error_stops_the_run() {
        let usa = Arc::new(Scripted::new("USA", Some(LayerName::Soil)));
        let mut registry = CountryRegistry::new();
        registry.register(usa.clone());

        assert!(registry.run_all("USA", &project()).await.is_err());
        assert_eq!(*usa.ran.lock().unwrap(), [LayerName::Soil]);
    }

    #[tokio::test]
    async fn unknown_country_is_unsupported_region() {
        let registry = CountryRegistry::new();
        let err = registry.run_all("FRA", &project()).await.unwrap_err();
        assert_eq!(err.to_string(), "No ETL module defined for country FRA");
        assert!(matches!(
            registry.layers("FRA"),
            Err(EtlError::UnsupportedRegion { .. })
        ));
    }

    #[tokio::test]
    async fn layer_aliases_dispatch() {
        let usa = Arc::new(Scripted::new("USA", None));
        let mut registry = CountryRegistry::new();
        registry.register(usa.clone());

        for alias in ["land_cover", "landcover", "land-cover"] {
            let outcome = registry.run_layer("USA", alias, &project()).await.unwrap();
            assert_eq!(outcome.layer, LayerName::LandCover);
        }

        for bad in ["hydrology", "dem"] {
            let err = registry.run_layer("USA", bad, &project()).await.unwrap_err();
            assert!(matches!(err, EtlError::UnsupportedLayer { .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn initialization_failures_do_not_stop_others() {
        let broken = Arc::new(Scripted::new("CAN", Some(LayerName::Soil)));
        let usa = Arc::new(Scripted::new("USA", None));
        let mut registry = CountryRegistry::new();
        registry.register(broken);
        registry.register(usa);

        registry
            .initialize_configured(&["CAN".to_string(), "XXX".to_string(), "USA".to_string()])
            .await;
        assert!(registry.initialize("USA").await.is_ok());
        assert!(registry.initialize("CAN").await.is_err());
    }
}
