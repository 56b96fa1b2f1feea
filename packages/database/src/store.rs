//! The document store trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::{DbError, Filter, Update};

/// Collection names used across the pipeline.
pub mod collections {
    pub const TERRAIN: &str = "terrain";
    pub const COUNTRIES: &str = "countries";
    pub const SUBDIVISIONS: &str = "subdivisions";
    pub const LAND_COVER_KEYS: &str = "land_cover_keys";
    pub const DATASETS: &str = "datasets";
    pub const REFRESH_JOBS: &str = "refresh_jobs";
}

/// Field every stored document is given on insert.
pub const ID_FIELD: &str = "_id";

/// What an [`DocumentStore::update_one`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// An existing document was modified.
    Updated,
    /// Nothing matched and a new document was inserted.
    Inserted,
    /// Nothing matched and upsert was not requested.
    NotFound,
}

/// A collection-oriented JSON document store.
///
/// Implementations must be safe to share across tasks; the pipeline holds
/// one `Arc<dyn DocumentStore>` for the lifetime of the process.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the first document (in insertion order) matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, DbError>;

    /// Returns every document matching `filter`, in insertion order.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, DbError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DbError>;

    /// Inserts one document, returning its id.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<String, DbError>;

    /// Inserts all documents or none of them.
    async fn insert_many(&self, collection: &str, documents: Vec<Value>) -> Result<usize, DbError>;

    /// Applies `update` to the first matching document, inserting a seeded
    /// document when nothing matches and `upsert` is set.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, DbError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, DbError>;
}

/// Ensures `document` is an object with an id, returning the id.
pub(crate) fn assign_id(document: &mut Value) -> Result<String, DbError> {
    let Some(map) = document.as_object_mut() else {
        return Err(DbError::Conversion {
            message: "documents must be JSON objects".to_string(),
        });
    };

    if let Some(id) = map.get(ID_FIELD).and_then(Value::as_str) {
        return Ok(id.to_string());
    }

    let id = uuid::Uuid::new_v4().to_string();
    map.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    Ok(id)
}
