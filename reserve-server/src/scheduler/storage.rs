//! redb-backed job table
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `scheduled_jobs` | `"{reservation_id}:{kind}"` | `ScheduledJob` (JSON) |
//!
//! One row per `(reservation_id, kind)` slot: writing a job into an
//! occupied slot replaces (supersedes) the previous job.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::job::ScheduledJob;
use crate::db::{self, StorageResult};

const JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("scheduled_jobs");

#[derive(Clone)]
pub struct JobStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for JobStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStorage").finish_non_exhaustive()
    }
}

impl JobStorage {
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
            let _ = write_txn.open_table(JOBS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Write a job into its slot, returning the job it superseded
    pub fn upsert(&self, job: &ScheduledJob) -> StorageResult<Option<ScheduledJob>> {
        let key = job.key();
        let value = serde_json::to_vec(job)?;

        let txn = self.db.begin_write()?;
        let previous = {
            let mut table = txn.open_table(JOBS_TABLE)?;
            let previous: Option<ScheduledJob> = match table.insert(key.as_str(), value.as_slice())? {
                Some(old) => Some(serde_json::from_slice(old.value())?),
                None => None,
            };
            previous
        };
        txn.commit()?;
        Ok(previous)
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<ScheduledJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Remove the slot only if it still holds job `id`
    pub fn remove_if_id(&self, key: &str, id: Uuid) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(JOBS_TABLE)?;
            let matches = match table.get(key)? {
                Some(value) => {
                    let job: ScheduledJob = serde_json::from_slice(value.value())?;
                    job.id == id
                }
                None => false,
            };
            if matches {
                table.remove(key)?;
            }
            matches
        };

        if removed {
            txn.commit()?;
        } else {
            txn.abort()?;
        }
        Ok(removed)
    }

    /// Remove whatever job occupies the slot
    pub fn remove(&self, key: &str) -> StorageResult<Option<ScheduledJob>> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(JOBS_TABLE)?;
            let removed: Option<ScheduledJob> = match table.remove(key)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All stored jobs ordered by `fire_at`
    pub fn all(&self) -> StorageResult<Vec<ScheduledJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut jobs = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            let job: ScheduledJob = serde_json::from_slice(value.value())?;
            jobs.push(job);
        }
        jobs.sort_by_key(|j| j.fire_at);
        Ok(jobs)
    }

    /// Jobs with `fire_at <= now`, oldest first
    pub fn due(&self, now: i64) -> StorageResult<Vec<ScheduledJob>> {
        let mut jobs = self.all()?;
        jobs.retain(|j| j.fire_at <= now);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{JobKind, job_key};
    use serde_json::json;

    fn job(reservation_id: &str, kind: JobKind, fire_at: i64) -> ScheduledJob {
        ScheduledJob::new(kind, reservation_id, fire_at, json!({}), 0)
    }

    #[test]
    fn test_upsert_supersedes_same_slot() {
        let storage = JobStorage::open_in_memory().unwrap();
        let first = job("r1", JobKind::ConfirmationPrompt, 100);
        let second = job("r1", JobKind::ConfirmationPrompt, 200);

        assert!(storage.upsert(&first).unwrap().is_none());
        let superseded = storage.upsert(&second).unwrap().unwrap();
        assert_eq!(superseded.id, first.id);

        let stored = storage.get(&first.key()).unwrap().unwrap();
        assert_eq!(stored.id, second.id);
        assert_eq!(storage.all().unwrap().len(), 1);
    }

    #[test]
    fn test_different_kinds_coexist() {
        let storage = JobStorage::open_in_memory().unwrap();
        storage.upsert(&job("r1", JobKind::ConfirmationPrompt, 100)).unwrap();
        storage.upsert(&job("r1", JobKind::ConfirmationTimeout, 50)).unwrap();

        let all = storage.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, JobKind::ConfirmationTimeout);
    }

    #[test]
    fn test_remove_if_id_ignores_stale_id() {
        let storage = JobStorage::open_in_memory().unwrap();
        let first = job("r1", JobKind::ConfirmationTimeout, 100);
        let second = job("r1", JobKind::ConfirmationTimeout, 200);
        storage.upsert(&first).unwrap();
        storage.upsert(&second).unwrap();

        assert!(!storage.remove_if_id(&first.key(), first.id).unwrap());
        assert!(storage.get(&first.key()).unwrap().is_some());
        assert!(storage.remove_if_id(&second.key(), second.id).unwrap());
        assert!(storage.get(&second.key()).unwrap().is_none());
    }

    #[test]
    fn test_due() {
        let storage = JobStorage::open_in_memory().unwrap();
        storage.upsert(&job("a", JobKind::ConfirmationPrompt, 300)).unwrap();
        storage.upsert(&job("b", JobKind::ConfirmationPrompt, 100)).unwrap();
        storage.upsert(&job("c", JobKind::ConfirmationPrompt, 200)).unwrap();

        let due: Vec<String> = storage
            .due(200)
            .unwrap()
            .into_iter()
            .map(|j| j.reservation_id)
            .collect();
        assert_eq!(due, vec!["b".to_string(), "c".to_string()]);

        let removed = storage.remove(&job_key("a", JobKind::ConfirmationPrompt)).unwrap();
        assert!(removed.is_some());
        assert!(storage.due(i64::MAX).unwrap().len() == 2);
    }
}
