use thiserror::Error;

use customer_crud_core::{projector::CustomerReadModel, CustomerId};
use customer_crud_storage::{Database, ReadModelError};

/// Lists read-side customers ordered by last name, first name and id.
///
/// The email filter is trimmed and lower-cased before the exact match; a blank
/// filter lists everyone.
pub async fn list_customers(
    read_db: &Database,
    email: Option<&str>,
) -> Result<Vec<CustomerReadModel>, QueryError> {
    let email = email
        .map(|raw| raw.trim().to_lowercase())
        .filter(|value| !value.is_empty());
    let rows = read_db.customer_reads().list(email.as_deref()).await?;
    Ok(rows)
}

pub async fn find_customer(
    read_db: &Database,
    id: &CustomerId,
) -> Result<Option<CustomerReadModel>, QueryError> {
    let row = read_db.customer_reads().find_by_id(id).await?;
    Ok(row)
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to read customers: {0}")]
    ReadModel(#[from] ReadModelError),
}
