use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Errors surfaced by Document Repository operations
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("An active request already exists for this student and document type ({0})")]
    Duplicate(String),
    #[error("No record found with id {0}")]
    NotFound(String),
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DatabaseError),
}

impl From<redb::CommitError> for RequestError {
    fn from(e: redb::CommitError) -> Self {
        RequestError::Persistence(e.into())
    }
}

impl From<redb::StorageError> for RequestError {
    fn from(e: redb::StorageError) -> Self {
        RequestError::Persistence(e.into())
    }
}

impl From<redb::TableError> for RequestError {
    fn from(e: redb::TableError) -> Self {
        RequestError::Persistence(e.into())
    }
}

impl From<rmp_serde::decode::Error> for RequestError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RequestError::Persistence(e.into())
    }
}

impl From<rmp_serde::encode::Error> for RequestError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RequestError::Persistence(e.into())
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub requests: u64,
    pub approvals: u64,
    pub completed: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("request-manager.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(REQUESTS)?;
            let _ = write_txn.open_table(REQUEST_KEYS)?;
            let _ = write_txn.open_table(STUDENT_REQUESTS)?;
            let _ = write_txn.open_table(APPROVALS)?;
            let _ = write_txn.open_table(COMPLETED)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut stats = PurgeStats::default();

        // Clear active requests
        {
            let table = write_txn.open_table(REQUESTS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(REQUESTS)?;
            for key in keys {
                table.remove(key.as_str())?;
                stats.requests += 1;
            }
        }

        // Clear the composite-key index
        {
            let table = write_txn.open_table(REQUEST_KEYS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(REQUEST_KEYS)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }

        // Clear the student index
        {
            let table = write_txn.open_table(STUDENT_REQUESTS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(STUDENT_REQUESTS)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }

        // Clear approvals
        {
            let table = write_txn.open_table(APPROVALS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(APPROVALS)?;
            for key in keys {
                table.remove(key.as_str())?;
                stats.approvals += 1;
            }
        }

        // Clear the completed ledger
        {
            let table = write_txn.open_table(COMPLETED)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(COMPLETED)?;
            for key in keys {
                table.remove(key.as_str())?;
                stats.completed += 1;
            }
        }

        write_txn.commit()?;
        Ok(stats)
    }
}
