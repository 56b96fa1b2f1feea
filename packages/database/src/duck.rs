//! `DuckDB`-backed document store.
//!
//! Documents live in a single `documents` table as JSON text, keyed by
//! `(collection, id)` and ordered by an insertion sequence. Filters are
//! evaluated in process after loading a collection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use duckdb::{Connection, params};
use serde_json::Value;

use crate::store::assign_id;
use crate::{DbError, DocumentStore, Filter, Update, UpdateOutcome};

/// A document store persisted in a `DuckDB` file.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }
        log::info!("Opening document store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a transient in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Conversion {
            message: "document store connection lock poisoned".to_string(),
        })
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS documents_seq;
        CREATE TABLE IF NOT EXISTS documents (
            seq BIGINT NOT NULL DEFAULT nextval('documents_seq'),
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );",
    )?;
    Ok(())
}

/// Loads `(id, document)` pairs of a collection in insertion order.
fn load(conn: &Connection, collection: &str) -> Result<Vec<(String, Value)>, DbError> {
    let mut stmt =
        conn.prepare("SELECT id, body FROM documents WHERE collection = ? ORDER BY seq")?;
    let rows = stmt.query_map([collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, body) = row?;
        documents.push((id, serde_json::from_str(&body)?));
    }
    Ok(documents)
}

fn insert(conn: &Connection, collection: &str, id: &str, document: &Value) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)",
        params![collection, id, serde_json::to_string(document)?],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for DuckDbStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, DbError> {
        let conn = self.lock()?;
        Ok(load(&conn, collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .find(|doc| filter.matches(doc)))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, DbError> {
        let conn = self.lock()?;
        Ok(load(&conn, collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DbError> {
        let conn = self.lock()?;
        if matches!(filter, Filter::All) {
            let count: i64 = conn
                .prepare("SELECT COUNT(*) FROM documents WHERE collection = ?")?
                .query_row([collection], |row| row.get(0))?;
            return Ok(u64::try_from(count).unwrap_or(0));
        }
        let count = load(&conn, collection)?
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .count();
        Ok(count as u64)
    }

    async fn insert_one(&self, collection: &str, mut document: Value) -> Result<String, DbError> {
        let id = assign_id(&mut document)?;
        let conn = self.lock()?;
        insert(&conn, collection, &id, &document)?;
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        mut documents: Vec<Value>,
    ) -> Result<usize, DbError> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in &mut documents {
            ids.push(assign_id(document)?);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (id, document) in ids.iter().zip(&documents) {
            insert(&tx, collection, id, document)?;
        }
        tx.commit()?;

        log::debug!("Inserted {} documents into {collection}", documents.len());
        Ok(documents.len())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, DbError> {
        let conn = self.lock()?;
        let existing = load(&conn, collection)?
            .into_iter()
            .find(|(_, doc)| filter.matches(doc));

        if let Some((id, mut doc)) = existing {
            update.apply(&mut doc);
            conn.execute(
                "UPDATE documents SET body = ? WHERE collection = ? AND id = ?",
                params![serde_json::to_string(&doc)?, collection, id],
            )?;
            return Ok(UpdateOutcome::Updated);
        }
        if !upsert {
            return Ok(UpdateOutcome::NotFound);
        }

        let mut seeded = update.seed(filter);
        let id = assign_id(&mut seeded)?;
        insert(&conn, collection, &id, &seeded)?;
        Ok(UpdateOutcome::Inserted)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, DbError> {
        let conn = self.lock()?;
        let ids: Vec<String> = load(&conn, collection)?
            .into_iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id)
            .collect();

        for id in &ids {
            conn.execute(
                "DELETE FROM documents WHERE collection = ? AND id = ?",
                params![collection, id],
            )?;
        }
        Ok(ids.len() as u64)
    }
}
