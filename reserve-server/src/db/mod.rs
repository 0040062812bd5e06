//! 嵌入式存储 (redb) 公共部分
//!
//! ReservationStorage 和 JobStorage 各自使用独立的 redb 文件，
//! 共享同一套错误类型和打开方式。

use std::path::Path;

use redb::Database;
use thiserror::Error;

use crate::utils::AppError;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("Reservation already exists: {0}")]
    DuplicateId(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ReservationNotFound(id) => AppError::reservation_not_found(&id),
            StorageError::DuplicateId(id) => {
                AppError::conflict(format!("Reservation {} already exists", id))
            }
            StorageError::Serialization(e) => {
                AppError::internal(format!("Corrupted record: {}", e))
            }
            // redb I/O, locking and commit failures may clear up on retry
            other => AppError::transient_store(other.to_string()),
        }
    }
}

/// Open or create a database file
///
/// redb uses `Durability::Immediate` by default: commits are persistent as
/// soon as `commit()` returns and the file is always in a consistent state.
pub fn open_file(path: impl AsRef<Path>) -> StorageResult<Database> {
    Ok(Database::create(path)?)
}

/// Open an in-memory database (for testing)
pub fn open_in_memory() -> StorageResult<Database> {
    Ok(Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?)
}
