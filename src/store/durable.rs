//! ACID-durable storage backed by redb.
//!
//! Two tables: `meta` for snapshot-style values under string keys, and
//! `journal` for append-only demand events keyed by sequence number.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::StoreResult;

/// Snapshot values (string keys → binary values).
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Append-only event log (sequence number → binary event).
const JOURNAL_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("journal");

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "compass.redb";

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// ACID-durable store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DB_FILE);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create both tables up front so read transactions never miss them.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(META_TABLE).map_err(redb_err("open_table"))?;
        txn.open_table(JOURNAL_TABLE).map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn.open_table(META_TABLE).map_err(redb_err("open_table"))?;
            table.insert(key, value).map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    /// Read a value by key. Returns `Ok(None)` if the key doesn't exist.
    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(META_TABLE).map_err(redb_err("open_table"))?;
        let result = table.get(key).map_err(redb_err("get"))?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    /// Append events after the current last sequence number, in one
    /// transaction. Returns the sequence number following the last write.
    pub fn append(&self, events: &[Vec<u8>]) -> StoreResult<u64> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let next = {
            let mut table = txn.open_table(JOURNAL_TABLE).map_err(redb_err("open_table"))?;
            let mut next = table
                .last()
                .map_err(redb_err("last"))?
                .map_or(0, |(k, _)| k.value() + 1);
            for event in events {
                table.insert(next, event.as_slice()).map_err(redb_err("insert"))?;
                next += 1;
            }
            next
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(next)
    }

    /// Every journal entry in sequence order.
    pub fn journal(&self) -> StoreResult<Vec<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(JOURNAL_TABLE).map_err(redb_err("open_table"))?;
        let mut entries = Vec::new();
        for item in table.iter().map_err(redb_err("iter"))? {
            let (_, value) = item.map_err(redb_err("iter"))?;
            entries.push(value.value().to_vec());
        }
        Ok(entries)
    }

    /// Number of journal entries (the next sequence number).
    pub fn journal_len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(JOURNAL_TABLE).map_err(redb_err("open_table"))?;
        Ok(table
            .last()
            .map_err(redb_err("last"))?
            .map_or(0, |(k, _)| k.value() + 1))
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        assert_eq!(store.get("ontology").unwrap(), None);
        store.put("ontology", b"v1").unwrap();
        store.put("ontology", b"v2").unwrap();
        assert_eq!(store.get("ontology").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn journal_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.journal_len().unwrap(), 0);

        assert_eq!(store.append(&[b"a".to_vec(), b"b".to_vec()]).unwrap(), 2);
        assert_eq!(store.append(&[b"c".to_vec()]).unwrap(), 3);
        assert_eq!(
            store.journal().unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.put("k", b"v").unwrap();
            store.append(&[b"e".to_vec()]).unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.journal_len().unwrap(), 1);
    }
}
