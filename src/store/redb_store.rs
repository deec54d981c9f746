//! Persistent store on top of redb.
//!
//! Each namespace is a `&[u8] -> &[u8]` table. Writes commit one
//! transaction per call.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::store::{KeyValueStore, StoreError, StoreResult};

fn table(namespace: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(namespace)
}

fn db_err<E: Into<redb::Error>>(e: E) -> StoreError {
    StoreError::Database(e.into())
}

/// redb-backed [`KeyValueStore`].
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        tracing::info!(path = %path.display(), "Opened wallet store");
        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = match txn.open_table(table(namespace)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };
        let value = table.get(key).map_err(db_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(table(namespace)).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(table(namespace)).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn keys(&self, namespace: &str) -> StoreResult<Vec<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = match txn.open_table(table(namespace)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(db_err(e)),
        };
        let mut keys = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            keys.push(key.value().to_vec());
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}
