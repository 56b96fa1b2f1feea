//! In-process document store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{ID_FIELD, assign_id};
use crate::{DbError, DocumentStore, Filter, Update, UpdateOutcome};

/// Keeps every collection in memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Vec<Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, DbError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, DbError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DbError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|doc| filter.matches(doc)).count());
        Ok(count as u64)
    }

    async fn insert_one(&self, collection: &str, mut document: Value) -> Result<String, DbError> {
        let id = assign_id(&mut document)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        ensure_unique(docs, collection, &id)?;
        docs.push(document);
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        mut documents: Vec<Value>,
    ) -> Result<usize, DbError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        // All or nothing, like a transaction.
        let mut batch_ids = BTreeSet::new();
        for document in &mut documents {
            let id = assign_id(document)?;
            ensure_unique(docs, collection, &id)?;
            if !batch_ids.insert(id.clone()) {
                return Err(duplicate(collection, &id));
            }
        }

        let count = documents.len();
        docs.extend(documents);
        Ok(count)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, DbError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) {
            update.apply(doc);
            return Ok(UpdateOutcome::Updated);
        }
        if !upsert {
            return Ok(UpdateOutcome::NotFound);
        }

        let mut seeded = update.seed(filter);
        assign_id(&mut seeded)?;
        docs.push(seeded);
        Ok(UpdateOutcome::Inserted)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, DbError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }
}

fn duplicate(collection: &str, id: &str) -> DbError {
    DbError::Conversion {
        message: format!("duplicate id {id} in {collection}"),
    }
}

fn ensure_unique(docs: &[Value], collection: &str, id: &str) -> Result<(), DbError> {
    if docs
        .iter()
        .any(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    {
        return Err(duplicate(collection, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_and_find_in_order() {
        let store = MemoryStore::new();
        store.insert_one("c", json!({"n": 1, "k": "a"})).await.unwrap();
        store.insert_one("c", json!({"n": 2, "k": "a"})).await.unwrap();

        let first = store.find_one("c", &Filter::eq("k", "a")).await.unwrap().unwrap();
        assert_eq!(first["n"], 1);
        assert!(first.get("_id").is_some());
        assert_eq!(store.count("c", &Filter::All).await.unwrap(), 2);
        assert_eq!(store.count("other", &Filter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        let result = store
            .insert_many("c", vec![json!({"ok": true}), json!("not an object")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count("c", &Filter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_many_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        store.insert_one("c", json!({"_id": "a"})).await.unwrap();
        assert!(store.insert_one("c", json!({"_id": "a"})).await.is_err());

        let existing = store
            .insert_many("c", vec![json!({"_id": "b"}), json!({"_id": "a"})])
            .await;
        assert!(existing.is_err());

        let in_batch = store
            .insert_many("c", vec![json!({"_id": "x"}), json!({"_id": "x"})])
            .await;
        assert!(in_batch.is_err());

        assert_eq!(store.count("c", &Filter::All).await.unwrap(), 1);
        assert_eq!(
            store
                .insert_many("c", vec![json!({"_id": "b"}), json!({})])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn update_sets_dotted_paths_and_upserts() {
        let store = MemoryStore::new();
        let filter = Filter::eq("project_id", "p1");

        let outcome = store
            .update_one("t", &filter, &Update::new().set("etl_layers.dem", json!("ok")), false)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);

        let outcome = store
            .update_one("t", &filter, &Update::new().set("etl_layers.dem", json!("ok")), true)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Inserted);

        let outcome = store
            .update_one("t", &filter, &Update::new().set("etl_layers.soil", json!("failed")), true)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let doc = store.find_one("t", &filter).await.unwrap().unwrap();
        assert_eq!(doc["etl_layers"], json!({"dem": "ok", "soil": "failed"}));
        assert_eq!(store.count("t", &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_many_removes_matches() {
        let store = MemoryStore::new();
        store.insert_one("t", json!({"project_id": "a"})).await.unwrap();
        store.insert_one("t", json!({"project_id": "b"})).await.unwrap();

        let removed = store.delete_many("t", &Filter::eq("project_id", "a")).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("t", &Filter::All).await.unwrap(), 1);
    }
}
