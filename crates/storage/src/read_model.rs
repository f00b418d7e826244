use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use thiserror::Error;

use customer_crud_core::{projector::CustomerReadModel, CustomerId};

use crate::to_rfc3339;

const SELECT_COLUMNS: &str = "SELECT id, firstname, lastname, date_of_birth, phone_number, email, \
     bank_account_number, updated_at FROM customer_read_models";

/// Query-side customer rows maintained by the projection worker.
#[derive(Clone)]
pub struct CustomerReadRepository {
    pool: SqlitePool,
}

impl CustomerReadRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a transaction on the read store.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, ReadModelError> {
        Ok(self.pool.begin().await?)
    }

    /// Lists customers ordered by last name, first name, then id.
    /// When `email` is given only exact (already normalised) matches are returned.
    pub async fn list(&self, email: Option<&str>) -> Result<Vec<CustomerReadModel>, ReadModelError> {
        let rows = match email {
            Some(email) => {
                sqlx::query_as::<_, ReadRow>(&format!(
                    "{SELECT_COLUMNS} WHERE email = ? ORDER BY lastname, firstname, id"
                ))
                .bind(email)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReadRow>(&format!(
                    "{SELECT_COLUMNS} ORDER BY lastname, firstname, id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(ReadRow::into_model).collect()
    }

    pub async fn find_by_id(
        &self,
        id: &CustomerId,
    ) -> Result<Option<CustomerReadModel>, ReadModelError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_in(&mut *conn, id).await
    }

    /// Loads one row using the caller's connection or transaction.
    pub async fn fetch_in(
        conn: &mut SqliteConnection,
        id: &CustomerId,
    ) -> Result<Option<CustomerReadModel>, ReadModelError> {
        let row = sqlx::query_as::<_, ReadRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(ReadRow::into_model).transpose()
    }

    pub async fn upsert(
        conn: &mut SqliteConnection,
        model: &CustomerReadModel,
    ) -> Result<(), ReadModelError> {
        sqlx::query(
            "INSERT INTO customer_read_models \
             (id, firstname, lastname, date_of_birth, phone_number, email, bank_account_number, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
               firstname = excluded.firstname, \
               lastname = excluded.lastname, \
               date_of_birth = excluded.date_of_birth, \
               phone_number = excluded.phone_number, \
               email = excluded.email, \
               bank_account_number = excluded.bank_account_number, \
               updated_at = excluded.updated_at",
        )
        .bind(model.id.to_string())
        .bind(&model.firstname)
        .bind(&model.lastname)
        .bind(model.date_of_birth)
        .bind(&model.phone_number)
        .bind(&model.email)
        .bind(&model.bank_account_number)
        .bind(to_rfc3339(model.updated_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Returns the number of rows removed.
    pub async fn delete(conn: &mut SqliteConnection, id: &CustomerId) -> Result<u64, ReadModelError> {
        let result = sqlx::query("DELETE FROM customer_read_models WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ReadRow {
    id: String,
    firstname: String,
    lastname: String,
    date_of_birth: NaiveDate,
    phone_number: String,
    email: String,
    bank_account_number: String,
    updated_at: DateTime<Utc>,
}

impl ReadRow {
    fn into_model(self) -> Result<CustomerReadModel, ReadModelError> {
        let id = self
            .id
            .parse::<CustomerId>()
            .map_err(|_| ReadModelError::Corrupt { id: self.id.clone() })?;
        Ok(CustomerReadModel {
            id,
            firstname: self.firstname,
            lastname: self.lastname,
            date_of_birth: self.date_of_birth,
            phone_number: self.phone_number,
            email: self.email,
            bank_account_number: self.bank_account_number,
            updated_at: self.updated_at,
        })
    }
}

/// Last event sequence applied by each named projection.
#[derive(Clone)]
pub struct ProjectionCheckpointRepository {
    pool: SqlitePool,
}

impl ProjectionCheckpointRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the stored sequence, or `0` when the projection has never run.
    pub async fn load(&self, projection: &str) -> Result<i64, ReadModelError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_sequence FROM projection_checkpoints WHERE projection = ?")
                .bind(projection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(sequence,)| sequence).unwrap_or(0))
    }

    pub async fn store(
        conn: &mut SqliteConnection,
        projection: &str,
        sequence: i64,
        at: DateTime<Utc>,
    ) -> Result<(), ReadModelError> {
        sqlx::query(
            "INSERT INTO projection_checkpoints (projection, last_sequence, updated_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT(projection) DO UPDATE SET \
               last_sequence = excluded.last_sequence, \
               updated_at = excluded.updated_at",
        )
        .bind(projection)
        .bind(sequence)
        .bind(to_rfc3339(at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("read model row has an invalid id '{id}'")]
    Corrupt { id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
