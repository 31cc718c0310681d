use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use cinder_core::NoteId;

use super::{NoteStore, StorageError, StoredNote};

/// In-memory note store.
///
/// A single mutex guards the whole map, so `take` is one critical section:
/// the lookup, expiry check and removal cannot interleave with another
/// caller. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    notes: Arc<Mutex<HashMap<NoteId, StoredNote>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<NoteId, StoredNote>>, StorageError> {
        self.notes.lock().map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))
    }
}

impl NoteStore for MemoryStorage {
    fn put(&self, id: NoteId, note: &StoredNote) -> Result<(), StorageError> {
        let mut notes = self.lock()?;
        if notes.contains_key(&id) {
            return Err(StorageError::Conflict);
        }
        notes.insert(id, note.clone());
        Ok(())
    }

    fn take(&self, id: NoteId, now_secs: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let mut notes = self.lock()?;
        let Some(note) = notes.remove(&id) else {
            return Ok(None);
        };

        debug_assert!(!notes.contains_key(&id));

        if note.is_expired(now_secs) { Ok(None) } else { Ok(Some(note.body)) }
    }

    fn purge_expired(&self, now_secs: u64) -> Result<usize, StorageError> {
        let mut notes = self.lock()?;
        let before = notes.len();
        notes.retain(|_, note| !note.is_expired(now_secs));
        Ok(before - notes.len())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }
}
