//! Chaos property tests for note stores
//!
//! Verifies the read-once contract when `ChaoticStorage` injects failures:
//! - A failed `put` stores nothing; a failed `take` consumes nothing
//! - No body is ever returned twice, however the failures fall
//! - Every body that is returned matches what was stored

use std::collections::{HashMap, HashSet};

use cinder_core::NoteId;
use cinder_server::storage::{
    ChaoticStorage, MemoryStorage, NoteStore, RedbStorage, StorageError, StoredNote,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn note_id(i: usize) -> NoteId {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&(i as u64).to_be_bytes());
    NoteId::from_bytes(bytes)
}

fn body(i: usize) -> Vec<u8> {
    format!("sealed-{i}").into_bytes()
}

/// Drive `storage` with puts then repeated takes, checking read-once on the
/// way. Returns how many notes were stored.
fn run_chaos<S: NoteStore>(storage: &ChaoticStorage<S>, note_count: usize, rounds: usize) -> usize {
    let mut stored = HashSet::new();
    for i in 0..note_count {
        let note = StoredNote { body: body(i), expires_at_secs: u64::MAX };
        match storage.put(note_id(i), &note) {
            Ok(()) => {
                stored.insert(i);
            },
            Err(StorageError::Io(_)) => {},
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    // ORACLE: failed puts left nothing behind
    assert_eq!(storage.inner().count().unwrap(), stored.len());

    let mut delivered: HashMap<usize, usize> = HashMap::new();
    for _ in 0..rounds {
        for i in 0..note_count {
            match storage.take(note_id(i), 0) {
                Ok(Some(bytes)) => {
                    assert_eq!(bytes, body(i), "body for note {i} changed in storage");
                    *delivered.entry(i).or_default() += 1;
                },
                Ok(None) | Err(StorageError::Io(_)) => {},
                Err(e) => panic!("Unexpected error: {e:?}"),
            }
        }
    }

    // PROPERTY: every note is delivered at most once, and only if stored
    for (i, count) in &delivered {
        assert_eq!(*count, 1, "note {i} delivered {count} times");
        assert!(stored.contains(i), "note {i} delivered but never stored");
    }

    // ORACLE: what was not delivered is still there
    assert_eq!(storage.inner().count().unwrap(), stored.len() - delivered.len());

    stored.len()
}

#[test]
fn prop_memory_read_once_under_chaos() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        note_count in 1usize..50,
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        run_chaos(&storage, note_count, 5);
    });
}

#[test]
fn prop_redb_read_once_under_chaos() {
    proptest!(ProptestConfig::with_cases(16), |(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        note_count in 1usize..20,
    )| {
        let dir = tempdir().unwrap();
        let redb = RedbStorage::open(dir.path().join("chaos.redb")).unwrap();
        let storage = ChaoticStorage::with_seed(redb, failure_rate, seed);
        run_chaos(&storage, note_count, 3);
    });
}

#[test]
fn prop_purge_under_chaos_never_touches_live_notes() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        expiries in prop::collection::vec(1u64..100, 1..40),
        now in 1u64..100,
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let inner = storage.inner().clone();

        for (i, expires_at_secs) in expiries.iter().enumerate() {
            inner.put(note_id(i), &StoredNote { body: body(i), expires_at_secs: *expires_at_secs }).unwrap();
        }

        let _ = storage.purge_expired(now);

        // PROPERTY: a note still before its expiry survives any sweep
        for (i, expires_at_secs) in expiries.iter().enumerate() {
            if *expires_at_secs > now {
                prop_assert_eq!(inner.take(note_id(i), now).unwrap(), Some(body(i)));
            }
        }
    });
}
