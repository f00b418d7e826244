use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::customer::CustomerId;
use crate::events::CustomerDomainEvent;

/// Denormalised customer row served by the query side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReadModel {
    pub id: CustomerId,
    pub firstname: String,
    pub lastname: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying one event to the read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionChange {
    Upsert(CustomerReadModel),
    Delete(CustomerId),
    /// The event targets a row that no longer exists.
    Skip,
}

/// Pure projector helpers that turn domain events into read-model changes.
pub struct CustomerProjector;

impl CustomerProjector {
    /// Computes the change for `event` given the row currently stored for its customer.
    pub fn apply(
        current: Option<&CustomerReadModel>,
        event: &CustomerDomainEvent,
    ) -> ProjectionChange {
        match event {
            CustomerDomainEvent::Created(created) => ProjectionChange::Upsert(CustomerReadModel {
                id: created.customer_id,
                firstname: created.firstname.clone(),
                lastname: created.lastname.clone(),
                date_of_birth: created.date_of_birth,
                phone_number: created.phone_number.clone(),
                email: created.email.clone(),
                bank_account_number: created.bank_account_number.clone(),
                updated_at: created.occurred_at,
            }),
            CustomerDomainEvent::PhoneNumberChanged {
                phone_number,
                occurred_at,
                ..
            } => match current {
                Some(row) => ProjectionChange::Upsert(CustomerReadModel {
                    phone_number: phone_number.clone(),
                    updated_at: *occurred_at,
                    ..row.clone()
                }),
                None => ProjectionChange::Skip,
            },
            CustomerDomainEvent::EmailChanged {
                email, occurred_at, ..
            } => match current {
                Some(row) => ProjectionChange::Upsert(CustomerReadModel {
                    email: email.clone(),
                    updated_at: *occurred_at,
                    ..row.clone()
                }),
                None => ProjectionChange::Skip,
            },
            CustomerDomainEvent::Deleted { customer_id, .. } => {
                ProjectionChange::Delete(*customer_id)
            }
        }
    }
}
