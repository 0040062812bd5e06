//! redb-based reservation store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `reservations` | `id` | `ReservationRequest` (JSON) | Records |
//! | `insertion_order` | `sequence` | `id` | Insertion-ordered listing |
//! | `sequence_by_id` | `id` | `sequence` | Reverse index for deletes |
//! | `sequence_counter` | `"seq"` | `u64` | Monotonic sequence |
//! | `drafts` | `user_id` | `StoredDraft` (JSON) | Draft sessions with expiry |
//!
//! # Concurrency
//!
//! redb serializes write transactions, so the read-check-write inside
//! [`ReservationStorage::compare_and_set_status`] is atomic with respect to
//! every other writer. No per-record lock is taken.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};

use shared::models::{DraftSession, LifecycleState, NewReservation, ReservationRequest};

use crate::db::{self, StorageError, StorageResult};
use crate::utils::AppResult;

/// key = reservation id, value = JSON-serialized ReservationRequest
const RESERVATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("reservations");

/// key = insertion sequence, value = reservation id
const ORDER_TABLE: TableDefinition<u64, &str> = TableDefinition::new("insertion_order");

/// key = reservation id, value = insertion sequence
const SEQ_BY_ID_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_by_id");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

/// key = user id, value = JSON-serialized StoredDraft
const DRAFTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("drafts");

const SEQUENCE_KEY: &str = "seq";

/// Draft plus its absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDraft {
    draft: DraftSession,
    /// Unix millis
    expires_at: i64,
}

/// Reservation and draft storage backed by redb
#[derive(Clone)]
pub struct ReservationStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for ReservationStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationStorage").finish_non_exhaustive()
    }
}

impl ReservationStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init(db::open_file(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(db::open_in_memory()?)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RESERVATIONS_TABLE)?;
            let _ = write_txn.open_table(ORDER_TABLE)?;
            let _ = write_txn.open_table(SEQ_BY_ID_TABLE)?;
            let _ = write_txn.open_table(DRAFTS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(SEQUENCE_KEY)?.is_none() {
                seq_table.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Increment and return the sequence number
    fn increment_sequence(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(SEQUENCE_KEY, next)?;
        Ok(next)
    }

    // ========== Reservations ==========

    /// Validate fields and persist a new PENDING reservation with a fresh id
    pub fn create(&self, fields: NewReservation, now: i64) -> AppResult<ReservationRequest> {
        let record = fields.into_record(shared::util::new_id(), now)?;
        self.insert(&record)?;
        Ok(record)
    }

    /// Persist a record under its id; fails if the id is taken
    pub fn insert(&self, record: &ReservationRequest) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RESERVATIONS_TABLE)?;
            if table.get(record.id.as_str())?.is_some() {
                return Err(StorageError::DuplicateId(record.id.clone()));
            }
            let value = serde_json::to_vec(record)?;
            table.insert(record.id.as_str(), value.as_slice())?;
        }

        let seq = self.increment_sequence(&txn)?;
        {
            let mut order = txn.open_table(ORDER_TABLE)?;
            order.insert(seq, record.id.as_str())?;
            let mut by_id = txn.open_table(SEQ_BY_ID_TABLE)?;
            by_id.insert(record.id.as_str(), seq)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get a reservation by id, if present
    pub fn find(&self, id: &str) -> StorageResult<Option<ReservationRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESERVATIONS_TABLE)?;

        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a reservation by id
    pub fn get(&self, id: &str) -> StorageResult<ReservationRequest> {
        self.find(id)?
            .ok_or_else(|| StorageError::ReservationNotFound(id.to_string()))
    }

    /// Atomic conditional transition.
    ///
    /// Moves the record from `expected` to `next` and returns true, or
    /// returns false without writing when the record is absent, its current
    /// state differs from `expected`, or `next` is not a lifecycle edge.
    pub fn compare_and_set_status(
        &self,
        id: &str,
        expected: LifecycleState,
        next: LifecycleState,
        external_reference: Option<&str>,
    ) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let applied = {
            let mut table = txn.open_table(RESERVATIONS_TABLE)?;

            // Read first to release the borrow before writing
            let current: Option<ReservationRequest> = match table.get(id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            match current {
                Some(mut record) if record.lifecycle_state() == expected => {
                    if record.transition(next, external_reference.map(str::to_string)) {
                        let value = serde_json::to_vec(&record)?;
                        table.insert(id, value.as_slice())?;
                        true
                    } else {
                        tracing::warn!(
                            reservation_id = %id,
                            from = %expected,
                            to = %next,
                            "Rejected transition outside lifecycle edges"
                        );
                        false
                    }
                }
                _ => false,
            }
        };

        if applied {
            txn.commit()?;
        } else {
            txn.abort()?;
        }
        Ok(applied)
    }

    /// Delete a reservation; returns whether it existed
    pub fn delete(&self, id: &str) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut table = txn.open_table(RESERVATIONS_TABLE)?;
            let existed = table.remove(id)?.is_some();

            let mut by_id = txn.open_table(SEQ_BY_ID_TABLE)?;
            let seq = by_id.remove(id)?.map(|guard| guard.value());
            if let Some(seq) = seq {
                let mut order = txn.open_table(ORDER_TABLE)?;
                order.remove(seq)?;
            }
            existed
        };
        txn.commit()?;
        Ok(existed)
    }

    /// Records matching `predicate`, in insertion order
    pub fn list_by_predicate<P>(&self, predicate: P) -> StorageResult<Vec<ReservationRequest>>
    where
        P: Fn(&ReservationRequest) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let order = read_txn.open_table(ORDER_TABLE)?;
        let table = read_txn.open_table(RESERVATIONS_TABLE)?;

        let mut records = Vec::new();
        for entry in order.iter()? {
            let (_seq, id) = entry?;
            if let Some(value) = table.get(id.value())? {
                let record: ReservationRequest = serde_json::from_slice(value.value())?;
                if predicate(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Number of stored reservations
    pub fn count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESERVATIONS_TABLE)?;
        Ok(table.len()?)
    }

    // ========== Drafts ==========

    /// Get a user's draft; an expired draft reads as absent
    pub fn get_draft(&self, user_id: i64, now: i64) -> StorageResult<Option<DraftSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DRAFTS_TABLE)?;

        match table.get(user_id)? {
            Some(value) => {
                let stored: StoredDraft = serde_json::from_slice(value.value())?;
                if stored.expires_at <= now {
                    Ok(None)
                } else {
                    Ok(Some(stored.draft))
                }
            }
            None => Ok(None),
        }
    }

    /// Store a draft, expiring `ttl` after `now`
    pub fn set_draft(&self, draft: &DraftSession, ttl: Duration, now: i64) -> StorageResult<()> {
        let stored = StoredDraft {
            draft: draft.clone(),
            expires_at: now + ttl.as_millis() as i64,
        };
        let value = serde_json::to_vec(&stored)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DRAFTS_TABLE)?;
            table.insert(draft.user_id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn clear_draft(&self, user_id: i64) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DRAFTS_TABLE)?;
            table.remove(user_id)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove every draft expired at `now`; returns how many were removed
    pub fn purge_expired_drafts(&self, now: i64) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DRAFTS_TABLE)?;

            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let stored: StoredDraft = serde_json::from_slice(value.value())?;
                if stored.expires_at <= now {
                    expired.push(key.value());
                }
            }

            for user_id in &expired {
                table.remove(*user_id)?;
            }
            expired.len()
        };
        txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ConfirmationStatus, ReservationStatus};
    use std::collections::HashSet;

    fn fields(user_id: i64, table: &str) -> NewReservation {
        NewReservation {
            user_id: Some(user_id),
            name: "Guest".into(),
            phone: Some("+79990000000".into()),
            guests: 2,
            table: Some(table.into()),
            table_id: Some(format!("tbl-{}", table)),
            date: Some("2024-06-01".into()),
            time: Some("19:00".into()),
        }
    }

    #[test]
    fn test_create_and_get() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let created = storage.create(fields(1, "5"), 1000).unwrap();

        let loaded = storage.get(&created.id).unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.status, ReservationStatus::Pending);
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_create_validation() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let mut missing = fields(1, "5");
        missing.time = None;

        let err = storage.create(missing, 0).unwrap_err();
        assert_eq!(err.code, shared::error::ErrorCode::RequiredField);
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.get("nope"),
            Err(StorageError::ReservationNotFound(_))
        ));
        assert!(storage.find("nope").unwrap().is_none());
    }

    #[test]
    fn test_create_yields_distinct_ids() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let mut ids = HashSet::new();
        for i in 0..10_000 {
            let record = storage.create(fields(i, "1"), i).unwrap();
            ids.insert(record.id);
        }
        assert_eq!(ids.len(), 10_000);
        assert_eq!(storage.count().unwrap(), 10_000);
    }

    #[test]
    fn test_compare_and_set_succeeds_once() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let id = storage.create(fields(1, "5"), 0).unwrap().id;

        assert!(
            storage
                .compare_and_set_status(&id, LifecycleState::Pending, LifecycleState::Confirmed, Some("ext-1"))
                .unwrap()
        );
        assert!(
            !storage
                .compare_and_set_status(&id, LifecycleState::Pending, LifecycleState::Confirmed, Some("ext-2"))
                .unwrap()
        );

        let record = storage.get(&id).unwrap();
        assert_eq!(record.status, ReservationStatus::Confirmed);
        assert_eq!(record.external_reference.as_deref(), Some("ext-1"));
    }

    #[test]
    fn test_concurrent_compare_and_set() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let id = storage.create(fields(1, "5"), 0).unwrap().id;

        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let storage = storage.clone();
                    let id = id.clone();
                    s.spawn(move || {
                        let reference = format!("ext-{}", i);
                        storage
                            .compare_and_set_status(
                                &id,
                                LifecycleState::Pending,
                                LifecycleState::Confirmed,
                                Some(reference.as_str()),
                            )
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_compare_and_set_rejects_invalid_edge() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let id = storage.create(fields(1, "5"), 0).unwrap().id;

        // PENDING -> CANCELED is not an edge
        assert!(
            !storage
                .compare_and_set_status(&id, LifecycleState::Pending, LifecycleState::Canceled, None)
                .unwrap()
        );
        assert_eq!(storage.get(&id).unwrap().status, ReservationStatus::Pending);

        // absent record
        assert!(
            !storage
                .compare_and_set_status("missing", LifecycleState::Pending, LifecycleState::Rejected, None)
                .unwrap()
        );
    }

    #[test]
    fn test_waiting_confirmation_substate() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let id = storage.create(fields(1, "5"), 0).unwrap().id;
        storage
            .compare_and_set_status(&id, LifecycleState::Pending, LifecycleState::Confirmed, Some("x"))
            .unwrap();
        assert!(
            storage
                .compare_and_set_status(
                    &id,
                    LifecycleState::Confirmed,
                    LifecycleState::WaitingConfirmation,
                    None
                )
                .unwrap()
        );

        let record = storage.get(&id).unwrap();
        assert_eq!(record.status, ReservationStatus::Confirmed);
        assert_eq!(record.confirmation_status, ConfirmationStatus::Waiting);

        // A plain CONFIRMED expectation no longer matches
        assert!(
            !storage
                .compare_and_set_status(&id, LifecycleState::Confirmed, LifecycleState::Canceled, None)
                .unwrap()
        );
    }

    #[test]
    fn test_list_by_predicate_keeps_insertion_order() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let a = storage.create(fields(1, "1"), 0).unwrap().id;
        let b = storage.create(fields(2, "2"), 0).unwrap().id;
        let c = storage.create(fields(1, "3"), 0).unwrap().id;

        let all: Vec<String> = storage
            .list_by_predicate(|_| true)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![a.clone(), b.clone(), c.clone()]);

        let mine: Vec<String> = storage
            .list_by_predicate(|r| r.user_id == 1)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(mine, vec![a.clone(), c.clone()]);

        assert!(storage.delete(&b).unwrap());
        assert!(!storage.delete(&b).unwrap());
        let remaining: Vec<String> = storage
            .list_by_predicate(|_| true)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining, vec![a, c]);
    }

    #[test]
    fn test_draft_ttl() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        let mut draft = DraftSession::start(9, Some("Ivan".into()), 0);
        draft.phone = Some("123".into());
        storage.set_draft(&draft, Duration::from_secs(1800), 0).unwrap();

        assert_eq!(storage.get_draft(9, 1_000).unwrap(), Some(draft.clone()));
        assert_eq!(storage.get_draft(9, 1_800_000).unwrap(), None);

        storage.clear_draft(9).unwrap();
        assert_eq!(storage.get_draft(9, 0).unwrap(), None);
    }

    #[test]
    fn test_purge_expired_drafts() {
        let storage = ReservationStorage::open_in_memory().unwrap();
        storage
            .set_draft(&DraftSession::start(1, None, 0), Duration::from_secs(10), 0)
            .unwrap();
        storage
            .set_draft(&DraftSession::start(2, None, 0), Duration::from_secs(100), 0)
            .unwrap();

        assert_eq!(storage.purge_expired_drafts(50_000).unwrap(), 1);
        assert!(storage.get_draft(1, 0).unwrap().is_none());
        assert!(storage.get_draft(2, 0).unwrap().is_some());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reservations.redb");

        let id = {
            let storage = ReservationStorage::open(&path).unwrap();
            storage.create(fields(1, "5"), 0).unwrap().id
        };

        let storage = ReservationStorage::open(&path).unwrap();
        assert_eq!(storage.get(&id).unwrap().table, "5");
        // Sequence continues after reopen
        let next = storage.create(fields(2, "6"), 0).unwrap().id;
        let ids: Vec<String> = storage
            .list_by_predicate(|_| true)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![id, next]);
    }
}
