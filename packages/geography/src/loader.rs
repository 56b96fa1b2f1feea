//! Idempotent loading of the country and subdivision collections.
//!
//! A collection that already holds documents is left alone, so running
//! initialization on every start is cheap. Archives are downloaded into
//! the datasets directory once and reused by later loads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use terrain_etl_database::{DocumentStore, Filter, collections};
use terrain_etl_source::ReferenceSource;
use terrain_etl_terrain_models::{CountryRecord, SubdivisionRecord};

use crate::datasets::{self, DatasetDefinition};
use crate::shapes::{self, Boundary};
use crate::{GeoError, scheduler};

/// What a load call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The collection already held this many documents.
    Skipped { existing: u64 },
    /// This many documents were inserted.
    Loaded { inserted: usize },
    /// No dataset is configured for the request.
    NotConfigured,
}

/// Inserts `documents`, falling back to one-by-one inserts when the bulk
/// insert fails. Individual failures are logged and skipped.
///
/// Returns the number of documents stored.
pub async fn insert_tolerant(
    store: &dyn DocumentStore,
    collection: &str,
    documents: Vec<Value>,
) -> usize {
    if documents.is_empty() {
        return 0;
    }

    match store.insert_many(collection, documents.clone()).await {
        Ok(inserted) => inserted,
        Err(e) => {
            log::warn!(
                "Bulk insert of {} documents into {collection} failed ({e}), inserting one by one",
                documents.len()
            );
            let mut inserted = 0;
            for (index, document) in documents.into_iter().enumerate() {
                match store.insert_one(collection, document).await {
                    Ok(_) => inserted += 1,
                    Err(e) => log::warn!("Skipping {collection} document {index}: {e}"),
                }
            }
            inserted
        }
    }
}

/// Downloads `url` to `dest` unless the file already exists.
///
/// # Errors
///
/// Returns [`GeoError`] if the download or the write fails.
pub async fn download_if_missing(
    source: &dyn ReferenceSource,
    url: &str,
    dest: &Path,
) -> Result<PathBuf, GeoError> {
    if tokio::fs::try_exists(dest).await? {
        log::info!("Using cached download {}", dest.display());
        return Ok(dest.to_path_buf());
    }

    let bytes = source.download(url).await?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = dest.with_extension("part");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, dest).await?;
    log::info!("Downloaded {url} to {}", dest.display());
    Ok(dest.to_path_buf())
}

/// Loads reference boundary collections.
#[derive(Clone)]
pub struct ReferenceLoader {
    store: Arc<dyn DocumentStore>,
    source: Arc<dyn ReferenceSource>,
    datasets_dir: PathBuf,
}

impl ReferenceLoader {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn ReferenceSource>,
        datasets_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            source,
            datasets_dir: datasets_dir.into(),
        }
    }

    /// Loads `countries` unless it already holds documents.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the count, download, archive read or
    /// metadata write fails.
    pub async fn ensure_countries(&self) -> Result<LoadOutcome, GeoError> {
        let existing = self
            .store
            .count(collections::COUNTRIES, &Filter::All)
            .await?;
        if existing > 0 {
            log::info!("Countries already loaded ({existing})");
            return Ok(LoadOutcome::Skipped { existing });
        }

        let dataset = datasets::countries()?;
        let boundaries = self.fetch_boundaries(&dataset).await?;

        let documents = boundaries
            .into_iter()
            .map(country_document)
            .collect::<Result<Vec<_>, _>>()?;
        let inserted =
            insert_tolerant(self.store.as_ref(), collections::COUNTRIES, documents).await;
        log::info!("Countries loaded: {inserted}");

        scheduler::register_dataset(
            self.store.as_ref(),
            &dataset.name,
            dataset.interval_days,
            Utc::now(),
        )
        .await?;
        Ok(LoadOutcome::Loaded { inserted })
    }

    /// Loads the subdivisions of `country` unless some are already stored.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the count, download, archive read or
    /// metadata write fails.
    pub async fn ensure_subdivisions(&self, country: &str) -> Result<LoadOutcome, GeoError> {
        let country = country.to_ascii_uppercase();
        let Some(dataset) = datasets::subdivisions_for(&country)? else {
            log::info!("No subdivision dataset configured for {country}");
            return Ok(LoadOutcome::NotConfigured);
        };

        let existing = self
            .store
            .count(collections::SUBDIVISIONS, &Filter::eq("country", country.as_str()))
            .await?;
        if existing > 0 {
            log::info!("Subdivisions already loaded for {country} ({existing})");
            return Ok(LoadOutcome::Skipped { existing });
        }

        let boundaries = self.fetch_boundaries(&dataset).await?;
        let documents = boundaries
            .into_iter()
            .map(|b| subdivision_document(&country, b))
            .collect::<Result<Vec<_>, _>>()?;
        let inserted =
            insert_tolerant(self.store.as_ref(), collections::SUBDIVISIONS, documents).await;
        log::info!("Subdivisions loaded for {country}: {inserted}");

        scheduler::register_dataset(
            self.store.as_ref(),
            &dataset.name,
            dataset.interval_days,
            Utc::now(),
        )
        .await?;
        Ok(LoadOutcome::Loaded { inserted })
    }

    /// Loads countries, then the subdivisions of each configured country.
    ///
    /// A failing subdivision dataset is logged and does not stop the
    /// others.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the country load fails.
    pub async fn ensure_all(&self, countries: &[String]) -> Result<(), GeoError> {
        self.ensure_countries().await?;
        for country in countries {
            if let Err(e) = self.ensure_subdivisions(country).await {
                log::error!("Subdivision load failed for {country}: {e}");
            }
        }
        Ok(())
    }

    async fn fetch_boundaries(
        &self,
        dataset: &DatasetDefinition,
    ) -> Result<Vec<Boundary>, GeoError> {
        let archive = download_if_missing(
            self.source.as_ref(),
            &dataset.url,
            &self.datasets_dir.join(&dataset.archive),
        )
        .await?;
        let extract_dir = self.datasets_dir.join(dataset.extract_dir_name());
        let code_fields = dataset.code_fields.clone();
        let name_fields = dataset.name_fields.clone();

        tokio::task::spawn_blocking(move || {
            shapes::extract_archive(&archive, &extract_dir)?;
            let shapefile = shapes::find_shapefile(&extract_dir)?;
            shapes::read_boundaries(&shapefile, &code_fields, &name_fields)
        })
        .await
        .map_err(|e| GeoError::Conversion {
            message: format!("boundary reader task failed: {e}"),
        })?
    }
}

fn country_document(boundary: Boundary) -> Result<Value, GeoError> {
    let record = CountryRecord {
        code: boundary.code,
        name: boundary.name,
        geometry: terrain_etl_geometry::to_geojson(&boundary.geometry)?,
    };
    Ok(serde_json::to_value(record)?)
}

fn subdivision_document(country: &str, boundary: Boundary) -> Result<Value, GeoError> {
    let record = SubdivisionRecord {
        country: country.to_string(),
        code: boundary.code,
        name: boundary.name,
        geometry: terrain_etl_geometry::to_geojson(&boundary.geometry)?,
    };
    Ok(serde_json::to_value(record)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use terrain_etl_database::{DbError, MemoryStore, Update, UpdateOutcome};
    use terrain_etl_source::SourceError;

    use super::*;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReferenceSource for CountingSource {
        async fn download(&self, _url: &str) -> Result<Vec<u8>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"archive".to_vec())
        }
    }

    /// Rejects bulk inserts and any document flagged `bad`.
    struct PickyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for PickyStore {
        async fn find_one(&self, c: &str, f: &Filter) -> Result<Option<Value>, DbError> {
            self.inner.find_one(c, f).await
        }

        async fn find(&self, c: &str, f: &Filter) -> Result<Vec<Value>, DbError> {
            self.inner.find(c, f).await
        }

        async fn count(&self, c: &str, f: &Filter) -> Result<u64, DbError> {
            self.inner.count(c, f).await
        }

        async fn insert_one(&self, c: &str, document: Value) -> Result<String, DbError> {
            if document.get("bad").is_some() {
                return Err(DbError::Conversion {
                    message: "rejected".to_string(),
                });
            }
            self.inner.insert_one(c, document).await
        }

        async fn insert_many(&self, _c: &str, _documents: Vec<Value>) -> Result<usize, DbError> {
            Err(DbError::Conversion {
                message: "bulk rejected".to_string(),
            })
        }

        async fn update_one(
            &self,
            c: &str,
            f: &Filter,
            u: &Update,
            upsert: bool,
        ) -> Result<UpdateOutcome, DbError> {
            self.inner.update_one(c, f, u, upsert).await
        }

        async fn delete_many(&self, c: &str, f: &Filter) -> Result<u64, DbError> {
            self.inner.delete_many(c, f).await
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "terrain_etl_loader_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn bulk_failure_falls_back_to_single_inserts() {
        let store = PickyStore {
            inner: MemoryStore::new(),
        };
        let documents = vec![
            json!({"code": "A"}),
            json!({"code": "B", "bad": true}),
            json!({"code": "C"}),
        ];

        let inserted = insert_tolerant(&store, collections::COUNTRIES, documents).await;

        assert_eq!(inserted, 2);
        assert_eq!(store.count(collections::COUNTRIES, &Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let store = MemoryStore::new();
        assert_eq!(insert_tolerant(&store, "x", Vec::new()).await, 0);
    }

    #[tokio::test]
    async fn populated_countries_are_not_downloaded_again() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store
            .insert_one(collections::COUNTRIES, json!({"code": "USA", "name": "United States"}))
            .await
            .unwrap();
        let source = Arc::new(CountingSource::default());
        let loader = ReferenceLoader::new(store.clone(), source.clone(), temp_dir("skip"));

        let first = loader.ensure_countries().await.unwrap();
        let second = loader.ensure_countries().await.unwrap();

        assert_eq!(first, LoadOutcome::Skipped { existing: 1 });
        assert_eq!(second, first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count(collections::COUNTRIES, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn populated_subdivisions_are_skipped_per_country() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store
            .insert_one(collections::SUBDIVISIONS, json!({"country": "USA", "code": "19153"}))
            .await
            .unwrap();
        let source = Arc::new(CountingSource::default());
        let loader = ReferenceLoader::new(store, source.clone(), temp_dir("subdiv"));

        assert_eq!(
            loader.ensure_subdivisions("usa").await.unwrap(),
            LoadOutcome::Skipped { existing: 1 }
        );
        assert_eq!(
            loader.ensure_subdivisions("FRA").await.unwrap(),
            LoadOutcome::NotConfigured
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_reuses_existing_file() {
        let dir = temp_dir("download");
        let dest = dir.join("countries.zip");
        let source = CountingSource::default();

        download_if_missing(&source, "http://example.invalid/c.zip", &dest)
            .await
            .unwrap();
        download_if_missing(&source, "http://example.invalid/c.zip", &dest)
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreadable_archive_fails_without_registering() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let loader = ReferenceLoader::new(
            store.clone(),
            Arc::new(CountingSource::default()),
            temp_dir("bad_archive"),
        );

        assert!(loader.ensure_countries().await.is_err());
        assert_eq!(store.count(collections::DATASETS, &Filter::All).await.unwrap(), 0);
        assert_eq!(store.count(collections::REFRESH_JOBS, &Filter::All).await.unwrap(), 0);
    }

    fn square(west: f64, south: f64) -> shapefile::Polygon {
        shapefile::Polygon::new(shapefile::PolygonRing::Outer(vec![
            shapefile::Point::new(west, south),
            shapefile::Point::new(west, south + 1.0),
            shapefile::Point::new(west + 1.0, south + 1.0),
            shapefile::Point::new(west + 1.0, south),
            shapefile::Point::new(west, south),
        ]))
    }

    /// Writes a two-feature country shapefile and zips it to `archive`.
    /// The second feature has blank attributes.
    fn write_countries_archive(archive: &Path) {
        use std::io::Write as _;

        use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};

        let staging = archive.with_extension("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let shp = staging.join("countries.shp");
        {
            let table = TableWriterBuilder::new()
                .add_character_field(FieldName::try_from("ADM0_A3").unwrap(), 10)
                .add_character_field(FieldName::try_from("NAME").unwrap(), 50);
            let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();

            let mut usa = Record::default();
            usa.insert(
                "ADM0_A3".to_string(),
                FieldValue::Character(Some("USA".to_string())),
            );
            usa.insert(
                "NAME".to_string(),
                FieldValue::Character(Some("United States".to_string())),
            );
            writer.write_shape_and_record(&square(-94.0, 41.0), &usa).unwrap();

            let mut blank = Record::default();
            blank.insert("ADM0_A3".to_string(), FieldValue::Character(None));
            blank.insert("NAME".to_string(), FieldValue::Character(None));
            writer.write_shape_and_record(&square(10.0, 10.0), &blank).unwrap();
        }

        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(std::fs::File::create(archive).unwrap());
        for ext in ["shp", "shx", "dbf"] {
            zip.start_file(
                format!("countries.{ext}"),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(&std::fs::read(staging.join(format!("countries.{ext}"))).unwrap())
                .unwrap();
        }
        zip.finish().unwrap();
        let _ = std::fs::remove_dir_all(&staging);
    }

    #[tokio::test]
    async fn countries_load_from_shapefile_once() {
        let dir = temp_dir("shapefile");
        write_countries_archive(&dir.join("countries.zip"));
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let source = Arc::new(CountingSource::default());
        let loader = ReferenceLoader::new(store.clone(), source.clone(), &dir);

        let first = loader.ensure_countries().await.unwrap();
        let second = loader.ensure_countries().await.unwrap();

        assert_eq!(first, LoadOutcome::Loaded { inserted: 2 });
        assert_eq!(second, LoadOutcome::Skipped { existing: 2 });
        assert_eq!(store.count(collections::COUNTRIES, &Filter::All).await.unwrap(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let usa = store
            .find_one(collections::COUNTRIES, &Filter::eq("code", "USA"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usa["name"], "United States");
        assert_eq!(usa["geometry"]["type"], "MultiPolygon");
        let unknown = store
            .find_one(collections::COUNTRIES, &Filter::eq("code", shapes::UNKNOWN_CODE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unknown["name"], shapes::UNKNOWN_NAME);

        let by_name = Filter::eq("name", "countries");
        assert!(store.find_one(collections::DATASETS, &by_name).await.unwrap().is_some());
        let job = store
            .find_one(collections::REFRESH_JOBS, &by_name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job["interval_days"], 365);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
