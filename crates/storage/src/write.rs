use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::debug;

use customer_crud_core::{AggregateRoot, Customer, CustomerId};

use crate::event_log::{EventLogError, EventLogRepository};
use crate::{is_unique_violation, to_rfc3339};

/// Table mapping for an aggregate persisted through [`GenericWriteRepository`].
#[async_trait]
pub trait SqlAggregate: AggregateRoot + Sized + 'static {
    async fn fetch(conn: &mut SqliteConnection, id: &Self::Id)
        -> Result<Option<Self>, sqlx::Error>;

    async fn insert_row(&self, conn: &mut SqliteConnection, at: DateTime<Utc>)
        -> Result<(), sqlx::Error>;

    /// Returns the number of rows touched.
    async fn update_row(&self, conn: &mut SqliteConnection, at: DateTime<Utc>)
        -> Result<u64, sqlx::Error>;

    /// Returns the number of rows removed.
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error>;
}

/// Generic write-side repository contract: stage changes, then commit them as one unit.
#[async_trait]
pub trait WriteRepository<T: AggregateRoot>: Send {
    async fn find(&self, id: &T::Id) -> Result<Option<T>, RepositoryError>;

    fn add(&mut self, aggregate: T);

    fn update(&mut self, aggregate: T);

    fn remove(&mut self, aggregate: T);

    /// Persists every staged change and its pending events in one transaction.
    async fn commit(&mut self) -> Result<CommitSummary, RepositoryError>;
}

enum PendingChange<T> {
    Add(T),
    Update(T),
    Remove(T),
}

/// SQLite unit of work for any [`SqlAggregate`].
///
/// Staged changes are dropped by `commit` regardless of its outcome.
pub struct GenericWriteRepository<T: SqlAggregate> {
    pool: SqlitePool,
    pending: Vec<PendingChange<T>>,
}

pub type CustomerWriteRepository = GenericWriteRepository<Customer>;

impl<T: SqlAggregate> GenericWriteRepository<T> {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            pending: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<T: SqlAggregate> fmt::Debug for GenericWriteRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericWriteRepository")
            .field("aggregate", &T::AGGREGATE_TYPE)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[async_trait]
impl<T: SqlAggregate> WriteRepository<T> for GenericWriteRepository<T> {
    async fn find(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let aggregate = T::fetch(&mut *conn, id).await?;
        Ok(aggregate)
    }

    fn add(&mut self, aggregate: T) {
        self.pending.push(PendingChange::Add(aggregate));
    }

    fn update(&mut self, aggregate: T) {
        self.pending.push(PendingChange::Update(aggregate));
    }

    fn remove(&mut self, aggregate: T) {
        self.pending.push(PendingChange::Remove(aggregate));
    }

    async fn commit(&mut self) -> Result<CommitSummary, RepositoryError> {
        let pending = std::mem::take(&mut self.pending);
        let mut summary = CommitSummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }

        let now = Utc::now();
        let entity = T::AGGREGATE_TYPE;
        let mut tx = self.pool.begin().await?;

        for change in pending {
            let mut aggregate = match change {
                PendingChange::Add(aggregate) => {
                    aggregate
                        .insert_row(&mut *tx, now)
                        .await
                        .map_err(|err| RepositoryError::from_write(entity, err))?;
                    summary.added += 1;
                    aggregate
                }
                PendingChange::Update(aggregate) => {
                    let touched = aggregate
                        .update_row(&mut *tx, now)
                        .await
                        .map_err(|err| RepositoryError::from_write(entity, err))?;
                    if touched == 0 {
                        return Err(RepositoryError::NotFound {
                            entity,
                            id: aggregate.id().to_string(),
                        });
                    }
                    summary.updated += 1;
                    aggregate
                }
                PendingChange::Remove(aggregate) => {
                    let removed = aggregate.delete_row(&mut *tx).await?;
                    if removed == 0 {
                        return Err(RepositoryError::NotFound {
                            entity,
                            id: aggregate.id().to_string(),
                        });
                    }
                    summary.removed += 1;
                    aggregate
                }
            };

            for event in aggregate.take_events() {
                let sequence =
                    EventLogRepository::append::<T>(&mut *tx, aggregate.id(), &event).await?;
                summary.events += 1;
                summary.last_sequence = Some(sequence);
            }
        }

        tx.commit().await?;
        debug!(
            stage = "storage",
            aggregate = entity,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            events = summary.events,
            "unit of work committed"
        );
        Ok(summary)
    }
}

/// Counts of what a commit persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub events: usize,
    /// Sequence of the last event appended to the log.
    pub last_sequence: Option<i64>,
}

/// Errors surfaced by the write repository. Store failures propagate unchanged.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} violates unique constraint on {constraint}")]
    UniqueViolation {
        entity: &'static str,
        constraint: String,
    },
    #[error("{entity} not found with id '{id}'")]
    NotFound { entity: &'static str, id: String },
    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    fn from_write(entity: &'static str, err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            let constraint = match &err {
                sqlx::Error::Database(db_err) => db_err
                    .message()
                    .split_once("failed: ")
                    .map(|(_, columns)| columns.to_string())
                    .unwrap_or_else(|| db_err.message().to_string()),
                _ => String::new(),
            };
            return Self::UniqueViolation { entity, constraint };
        }
        Self::Database(err)
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    firstname: String,
    lastname: String,
    date_of_birth: NaiveDate,
    phone_number: String,
    email: String,
    bank_account_number: String,
}

impl CustomerRow {
    fn into_domain(self) -> Result<Customer, sqlx::Error> {
        let id: CustomerId = self
            .id
            .parse()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        Ok(Customer::rehydrate(
            id,
            self.firstname,
            self.lastname,
            self.date_of_birth,
            self.phone_number,
            self.email,
            self.bank_account_number,
        ))
    }
}

#[async_trait]
impl SqlAggregate for Customer {
    async fn fetch(
        conn: &mut SqliteConnection,
        id: &CustomerId,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, firstname, lastname, date_of_birth, phone_number, email, bank_account_number \
               FROM customers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(CustomerRow::into_domain).transpose()
    }

    async fn insert_row(
        &self,
        conn: &mut SqliteConnection,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let timestamp = to_rfc3339(at);
        sqlx::query(
            "INSERT INTO customers \
             (id, firstname, lastname, date_of_birth, phone_number, email, bank_account_number, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id().to_string())
        .bind(self.firstname())
        .bind(self.lastname())
        .bind(self.date_of_birth())
        .bind(self.phone_number())
        .bind(self.email())
        .bind(self.bank_account_number())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update_row(
        &self,
        conn: &mut SqliteConnection,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE customers \
                SET firstname = ?, lastname = ?, date_of_birth = ?, phone_number = ?, \
                    email = ?, bank_account_number = ?, updated_at = ? \
              WHERE id = ?",
        )
        .bind(self.firstname())
        .bind(self.lastname())
        .bind(self.date_of_birth())
        .bind(self.phone_number())
        .bind(self.email())
        .bind(self.bank_account_number())
        .bind(to_rfc3339(at))
        .bind(self.id().to_string())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(self.id().to_string())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
