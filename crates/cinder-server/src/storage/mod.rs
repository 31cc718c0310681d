//! Note storage
//!
//! Trait-based abstraction over the note store. The trait is synchronous (no
//! async): every operation is a short critical section or a single database
//! transaction.
//!
//! # Read-once contract
//!
//! [`NoteStore::take`] is the only way to read a note and it deletes what it
//! returns in the same atomic step. Two `take` calls for one id, sequential or
//! concurrent, never both return the body. An expired note is deleted by the
//! `take` that finds it and reported exactly like a missing one.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::path::PathBuf;

use cinder_core::NoteId;
pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// A stored note: ciphertext plus wall-clock expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNote {
    /// Sealed body (`nonce || ciphertext || tag`).
    pub body: Vec<u8>,
    /// Unix second from which the note is gone.
    pub expires_at_secs: u64,
}

impl StoredNote {
    /// Whether the note is past its lifetime at `now_secs`.
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at_secs
    }
}

/// Storage abstraction for notes
///
/// Must be Clone (shared between the driver and background tasks), Send +
/// Sync, and synchronous. Implementations share internal state via Arc, so
/// clones access the same underlying storage.
pub trait NoteStore: Clone + Send + Sync + 'static {
    /// Insert a new note.
    ///
    /// # Invariants
    ///
    /// - Pre: `id` is not already stored
    /// - Post: the note is fully stored, or nothing is (`Conflict` if `id`
    ///   exists; the existing note is untouched)
    fn put(&self, id: NoteId, note: &StoredNote) -> Result<(), StorageError>;

    /// Atomically remove a note and return its body.
    ///
    /// Returns `None` if the note is missing, already taken, or expired at
    /// `now_secs`. An expired note is deleted as a side effect.
    fn take(&self, id: NoteId, now_secs: u64) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete every note expired at `now_secs`. Returns how many were removed.
    fn purge_expired(&self, now_secs: u64) -> Result<usize, StorageError>;

    /// Number of stored notes, including expired ones not yet purged.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Storage backend selection for the server runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Notes live in process memory and vanish on restart.
    #[default]
    Memory,
    /// Notes persist in a redb database file.
    Redb {
        /// Database file path
        path: PathBuf,
    },
}

impl StorageBackend {
    /// Open the configured backend.
    pub fn open(&self) -> Result<AnyStorage, StorageError> {
        match self {
            Self::Memory => Ok(AnyStorage::Memory(MemoryStorage::new())),
            Self::Redb { path } => RedbStorage::open(path).map(AnyStorage::Redb),
        }
    }
}

/// Backend chosen at runtime.
#[derive(Clone)]
pub enum AnyStorage {
    /// In-memory backend
    Memory(MemoryStorage),
    /// Durable backend
    Redb(RedbStorage),
}

impl NoteStore for AnyStorage {
    fn put(&self, id: NoteId, note: &StoredNote) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.put(id, note),
            Self::Redb(s) => s.put(id, note),
        }
    }

    fn take(&self, id: NoteId, now_secs: u64) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Memory(s) => s.take(id, now_secs),
            Self::Redb(s) => s.take(id, now_secs),
        }
    }

    fn purge_expired(&self, now_secs: u64) -> Result<usize, StorageError> {
        match self {
            Self::Memory(s) => s.purge_expired(now_secs),
            Self::Redb(s) => s.purge_expired(now_secs),
        }
    }

    fn count(&self) -> Result<usize, StorageError> {
        match self {
            Self::Memory(s) => s.count(),
            Self::Redb(s) => s.count(),
        }
    }
}
