use serde::de::DeserializeOwned;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use customer_crud_core::{AggregateRoot, DomainEvent};

use crate::to_rfc3339;

/// Append-only log of domain events written by the unit of work.
#[derive(Clone)]
pub struct EventLogRepository {
    pool: SqlitePool,
}

impl EventLogRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends one event inside the caller's transaction and returns its sequence.
    pub(crate) async fn append<A: AggregateRoot>(
        conn: &mut SqliteConnection,
        aggregate_id: &A::Id,
        event: &A::Event,
    ) -> Result<i64, EventLogError> {
        let payload_json = serde_json::to_string(event)?;
        let result = sqlx::query(
            "INSERT INTO customer_events \
             (aggregate_type, aggregate_id, event_type, payload_json, occurred_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(A::AGGREGATE_TYPE)
        .bind(aggregate_id.to_string())
        .bind(event.event_type())
        .bind(payload_json)
        .bind(to_rfc3339(event.occurred_at()))
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Lists events with a sequence strictly greater than `after`, oldest first.
    pub async fn fetch_after(&self, after: i64, limit: i64) -> Result<Vec<StoredEvent>, EventLogError> {
        let rows = sqlx::query_as::<_, StoredEvent>(
            "SELECT sequence, aggregate_type, aggregate_id, event_type, payload_json, occurred_at \
               FROM customer_events \
              WHERE sequence > ? \
              ORDER BY sequence ASC \
              LIMIT ?",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns the highest recorded sequence, or `0` for an empty log.
    pub async fn latest_sequence(&self) -> Result<i64, EventLogError> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(sequence) FROM customer_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0))
    }
}

/// Event log row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEvent {
    pub sequence: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload_json: String,
    pub occurred_at: String,
}

impl StoredEvent {
    /// Decodes the JSON payload into the aggregate's event type.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, EventLogError> {
        serde_json::from_str(&self.payload_json).map_err(|source| EventLogError::Decode {
            sequence: self.sequence,
            source,
        })
    }
}

/// Errors that can occur while appending to or reading the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("failed to serialize domain event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to decode event {sequence}: {source}")]
    Decode {
        sequence: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
