mod event_log;
mod read_model;
mod write;

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

use customer_crud_core::Customer;

pub use event_log::{EventLogError, EventLogRepository, StoredEvent};
pub use read_model::{CustomerReadRepository, ProjectionCheckpointRepository, ReadModelError};
pub use write::{
    CommitSummary, CustomerWriteRepository, GenericWriteRepository, RepositoryError,
    SqlAggregate, WriteRepository,
};

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level database handle that owns the SQLite connection pool.
///
/// Cloning is cheap; every repository handed out by the factory methods is a
/// fresh value sharing the pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Options)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a new unit of work over the `customers` table.
    pub fn customer_writes(&self) -> CustomerWriteRepository {
        GenericWriteRepository::<Customer>::new(self.pool.clone())
    }

    /// Returns a handle for reading the domain event log.
    pub fn event_log(&self) -> EventLogRepository {
        EventLogRepository::new(self.pool.clone())
    }

    /// Returns a handle for the customer read model.
    pub fn customer_reads(&self) -> CustomerReadRepository {
        CustomerReadRepository::new(self.pool.clone())
    }

    /// Returns a handle for projection checkpoints.
    pub fn projection_checkpoints(&self) -> ProjectionCheckpointRepository {
        ProjectionCheckpointRepository::new(self.pool.clone())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid sqlite connection string: {0}")]
    Options(sqlx::Error),
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns `true` when the error is an SQLite unique or primary key violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("2067") | Some("1555"))
        }
        _ => false,
    }
}
