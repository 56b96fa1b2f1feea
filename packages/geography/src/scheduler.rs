//! Dataset refresh bookkeeping.
//!
//! A loaded dataset gets a `datasets` record (when it was downloaded and
//! when it expires) and a `refresh_jobs` record (when to fetch it again).
//! Both are upserted by name, always together. Nothing executes the jobs
//! yet; they are read by whatever refresh runner is deployed.

use chrono::{DateTime, Duration, Utc};
use terrain_etl_database::{DocumentStore, Filter, Update, collections};
use terrain_etl_terrain_models::{DatasetMetadata, RefreshJob};

use crate::GeoError;

/// Refresh interval used for every reference dataset.
pub const DEFAULT_INTERVAL_DAYS: u32 = 365;

/// A dataset expires a year after it was downloaded.
#[must_use]
pub fn dataset_metadata(name: &str, downloaded_at: DateTime<Utc>) -> DatasetMetadata {
    DatasetMetadata {
        name: name.to_string(),
        downloaded_at,
        expires_at: downloaded_at + Duration::days(365),
    }
}

/// The next refresh is `interval_days` after `now`.
#[must_use]
pub fn refresh_job(name: &str, interval_days: u32, now: DateTime<Utc>) -> RefreshJob {
    RefreshJob {
        name: name.to_string(),
        next_run_at: now + Duration::days(i64::from(interval_days)),
        interval_days,
    }
}

/// Upserts the `datasets` and `refresh_jobs` records for `name`.
///
/// # Errors
///
/// Returns [`GeoError`] if either write fails.
pub async fn register_dataset(
    store: &dyn DocumentStore,
    name: &str,
    interval_days: u32,
    now: DateTime<Utc>,
) -> Result<(), GeoError> {
    let by_name = Filter::eq("name", name);

    let metadata = serde_json::to_value(dataset_metadata(name, now))?;
    store
        .update_one(collections::DATASETS, &by_name, &set_all(metadata), true)
        .await?;

    let job = serde_json::to_value(refresh_job(name, interval_days, now))?;
    store
        .update_one(collections::REFRESH_JOBS, &by_name, &set_all(job), true)
        .await?;

    log::info!("Registered dataset {name} (refresh every {interval_days} days)");
    Ok(())
}

/// `$set` of every top-level field of an object.
fn set_all(value: serde_json::Value) -> Update {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .fold(Update::new(), |update, (key, value)| update.set(key, value)),
        _ => Update::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use terrain_etl_database::MemoryStore;

    use super::*;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn metadata_expires_after_365_days() {
        let meta = dataset_metadata("countries", jan_first());
        assert_eq!(meta.expires_at, Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn job_runs_after_interval() {
        let job = refresh_job("countries", 30, jan_first());
        assert_eq!(job.next_run_at, Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap());
        assert_eq!(job.interval_days, 30);
    }

    #[tokio::test]
    async fn registering_twice_keeps_one_record_each() {
        let store = MemoryStore::new();
        register_dataset(&store, "countries", 365, jan_first()).await.unwrap();
        register_dataset(&store, "countries", 365, jan_first() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(store.count(collections::DATASETS, &Filter::All).await.unwrap(), 1);
        assert_eq!(store.count(collections::REFRESH_JOBS, &Filter::All).await.unwrap(), 1);

        let stored = store
            .find_one(collections::DATASETS, &Filter::eq("name", "countries"))
            .await
            .unwrap()
            .unwrap();
        let meta: DatasetMetadata = serde_json::from_value(stored).unwrap();
        assert_eq!(meta.downloaded_at, jan_first() + Duration::days(1));
    }
}
