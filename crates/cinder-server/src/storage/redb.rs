//! Redb-backed durable note store.
//!
//! Every operation runs in a single redb transaction. `take` reads and removes
//! the note inside one write transaction, and redb serializes writers, so two
//! concurrent `take` calls for the same id cannot both observe the note.

use std::{path::Path, sync::Arc};

use cinder_core::NoteId;
use redb::{Database, ReadableTable, TableDefinition};

use super::{NoteStore, StorageError, StoredNote};

/// Table: notes
/// Key: note id [16 bytes]
/// Value: CBOR-encoded StoredNote
const NOTES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("notes");

/// Durable note store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(NOTES).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl NoteStore for RedbStorage {
    fn put(&self, id: NoteId, note: &StoredNote) -> Result<(), StorageError> {
        let mut bytes = Vec::with_capacity(note.body.len() + 16);
        ciborium::into_writer(note, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(NOTES).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = id.as_bytes().as_slice();
            if table.get(key).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::Conflict);
            }

            table.insert(key, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn take(&self, id: NoteId, now_secs: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let removed: Option<StoredNote> = {
            let mut table = txn.open_table(NOTES).map_err(|e| StorageError::Io(e.to_string()))?;

            let removed = table
                .remove(id.as_bytes().as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            match removed {
                Some(value) => Some(
                    ciborium::from_reader(value.value())
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                ),
                None => None,
            }
        };

        let Some(note) = removed else {
            txn.abort().map_err(|e| StorageError::Io(e.to_string()))?;
            return Ok(None);
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        if note.is_expired(now_secs) { Ok(None) } else { Ok(Some(note.body)) }
    }

    fn purge_expired(&self, now_secs: u64) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let purged = {
            let mut table = txn.open_table(NOTES).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut expired: Vec<Vec<u8>> = Vec::new();
            for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
                let (key, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
                let note: StoredNote = ciborium::from_reader(value.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                if note.is_expired(now_secs) {
                    expired.push(key.value().to_vec());
                }
            }

            for key in &expired {
                table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            }

            expired.len()
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(purged)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(NOTES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut count = 0;
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            result.map_err(|e| StorageError::Io(e.to_string()))?;
            count += 1;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn id(byte: u8) -> NoteId {
        NoteId::from_bytes([byte; 16])
    }

    fn note(body: &[u8], expires_at_secs: u64) -> StoredNote {
        StoredNote { body: body.to_vec(), expires_at_secs }
    }

    #[test]
    fn test_take_is_read_once() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.put(id(1), &note(b"sealed body", 1_000)).unwrap();

        assert_eq!(storage.take(id(1), 500).unwrap(), Some(b"sealed body".to_vec()));
        assert_eq!(storage.take(id(1), 500).unwrap(), None);
    }

    #[test]
    fn test_take_unknown_id() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        assert_eq!(storage.take(id(9), 0).unwrap(), None);
    }

    #[test]
    fn test_take_expired_removes_note() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.put(id(1), &note(b"old", 100)).unwrap();

        assert_eq!(storage.take(id(1), 101).unwrap(), None);
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_put_conflict_keeps_original() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.put(id(1), &note(b"first", 100)).unwrap();

        match storage.put(id(1), &note(b"second", 100)) {
            Err(StorageError::Conflict) => {},
            other => panic!("Expected Conflict error, got: {other:?}"),
        }

        assert_eq!(storage.take(id(1), 0).unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        for (byte, expires) in [(1u8, 10u64), (2, 20), (3, 30), (4, 40)] {
            storage.put(id(byte), &note(&[byte; 8], expires)).unwrap();
        }

        assert_eq!(storage.purge_expired(25).unwrap(), 2);
        assert_eq!(storage.count().unwrap(), 2);
        assert_eq!(storage.take(id(3), 25).unwrap(), Some(vec![3; 8]));
    }
}
