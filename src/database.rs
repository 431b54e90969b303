//! Database initialization and the redb-backed link store
//!
//! This module handles the setup of the embedded redb database and implements
//! [`LinkStore`] on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::config::AppConfig;
use crate::error::StoreError;
use crate::model::{LinkPatch, SmartLinkRecord};
use crate::pipeline::Renderer;
use crate::store::{apply_patch, LinkStore};

/// Main table for storing smart link records
///
/// Key: Short code as string
/// Value: JSON-serialized SmartLinkRecord as string
///
/// Example:
/// - Key: "aB3dE9xY2q"
/// - Value: '{"short_code":"aB3dE9xY2q","original_url":"https://example.com",...}'
pub const TABLE_LINKS: TableDefinition<&str, &str> = TableDefinition::new("smart_links_v1");

/// Application state shared across all request handlers
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Smart link storage
    pub store: Arc<dyn LinkStore>,

    /// QR render pipeline
    pub renderer: Arc<Renderer>,

    /// Runtime configuration (base URL, auth secret, ...)
    pub config: Arc<AppConfig>,
}

/// Initializes the embedded database and creates required tables
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "data.db")
///
/// # Example
///
/// ```no_run
/// # use qrenzo::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    // Create or open the database file
    let db = Database::create(db_path)?;

    // Open (or create if not exists) the links table, then persist it
    let write_txn = db.begin_write()?;
    write_txn.open_table(TABLE_LINKS)?;
    write_txn.commit()?;

    Ok(db)
}

/// [`LinkStore`] persisted in a redb file
///
/// Transactions are short and run inline on the calling task.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(db_path)?))
    }
}

fn decode(code: &str, json: &str) -> Result<SmartLinkRecord, StoreError> {
    serde_json::from_str(json).map_err(|source| StoreError::Malformed {
        key: code.to_string(),
        source,
    })
}

fn encode(code: &str, record: &SmartLinkRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|source| StoreError::Malformed {
        key: code.to_string(),
        source,
    })
}

#[async_trait]
impl LinkStore for RedbStore {
    async fn get(&self, code: &str) -> Result<Option<SmartLinkRecord>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(TABLE_LINKS).map_err(StoreError::backend)?;

        let value = table.get(code).map_err(StoreError::backend)?;
        value.map(|guard| decode(code, guard.value())).transpose()
    }

    async fn put(&self, code: &str, record: &SmartLinkRecord) -> Result<(), StoreError> {
        let json = encode(code, record)?;

        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn.open_table(TABLE_LINKS).map_err(StoreError::backend)?;

            // Check if the code is already taken
            if table.get(code).map_err(StoreError::backend)?.is_some() {
                return Err(StoreError::Conflict(code.to_string()));
            }
            table.insert(code, json.as_str()).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    async fn update(&self, code: &str, patch: LinkPatch) -> Result<Option<SmartLinkRecord>, StoreError> {
        // Read and write under one write transaction so concurrent increments
        // are serialized by redb
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let updated = {
            let mut table = write_txn.open_table(TABLE_LINKS).map_err(StoreError::backend)?;

            let current = match table.get(code).map_err(StoreError::backend)? {
                Some(guard) => decode(code, guard.value())?,
                None => return Ok(None),
            };

            let mut record = current;
            apply_patch(&mut record, patch);
            table
                .insert(code, encode(code, &record)?.as_str())
                .map_err(StoreError::backend)?;
            record
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn record(code: &str) -> SmartLinkRecord {
        let now = Utc::now();
        SmartLinkRecord {
            short_code: code.into(),
            original_url: "https://example.com".into(),
            tracking: true,
            expiry: None,
            password: None,
            clicks: 0,
            created: now,
            updated: now,
        }
    }

    fn temp_store() -> (RedbStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = RedbStore::open(file.path().to_str().unwrap()).unwrap();
        (store, file)
    }

    #[tokio::test]
    async fn put_then_get() {
        let (store, _file) = temp_store();
        let original = record("abc");
        store.put("abc", &original).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), Some(original));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_refuses_to_overwrite() {
        let (store, _file) = temp_store();
        store.put("abc", &record("abc")).await.unwrap();
        let err = store.put("abc", &record("abc")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(code) if code == "abc"));
    }

    #[tokio::test]
    async fn update_increments_clicks() {
        let (store, _file) = temp_store();
        store.put("abc", &record("abc")).await.unwrap();
        store.update("abc", LinkPatch::click()).await.unwrap();
        let updated = store.update("abc", LinkPatch::click()).await.unwrap().unwrap();
        assert_eq!(updated.clicks, 2);
        assert_eq!(store.get("abc").await.unwrap().unwrap().clicks, 2);
    }

    #[tokio::test]
    async fn update_missing_is_none() {
        let (store, _file) = temp_store();
        assert!(store.update("nope", LinkPatch::click()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let (store, _file) = temp_store();
        let write_txn = store.db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(TABLE_LINKS).unwrap();
            table.insert("bad", "{not json").unwrap();
        }
        write_txn.commit().unwrap();

        assert!(matches!(store.get("bad").await, Err(StoreError::Malformed { .. })));
    }
}
