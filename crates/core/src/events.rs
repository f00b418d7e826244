use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::customer::CustomerId;

/// Snapshot of a newly created customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreatedDomainEvent {
    pub customer_id: CustomerId,
    pub firstname: String,
    pub lastname: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
    pub occurred_at: DateTime<Utc>,
}

/// Events recorded by the customer aggregate.
///
/// The serde tag doubles as the `event_type` column of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CustomerDomainEvent {
    #[serde(rename = "customer.created")]
    Created(CustomerCreatedDomainEvent),
    #[serde(rename = "customer.phone_number_changed")]
    PhoneNumberChanged {
        customer_id: CustomerId,
        phone_number: String,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "customer.email_changed")]
    EmailChanged {
        customer_id: CustomerId,
        email: String,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "customer.deleted")]
    Deleted {
        customer_id: CustomerId,
        occurred_at: DateTime<Utc>,
    },
}

impl CustomerDomainEvent {
    pub fn customer_id(&self) -> &CustomerId {
        match self {
            Self::Created(created) => &created.customer_id,
            Self::PhoneNumberChanged { customer_id, .. }
            | Self::EmailChanged { customer_id, .. }
            | Self::Deleted { customer_id, .. } => customer_id,
        }
    }
}

impl DomainEvent for CustomerDomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "customer.created",
            Self::PhoneNumberChanged { .. } => "customer.phone_number_changed",
            Self::EmailChanged { .. } => "customer.email_changed",
            Self::Deleted { .. } => "customer.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created(created) => created.occurred_at,
            Self::PhoneNumberChanged { occurred_at, .. }
            | Self::EmailChanged { occurred_at, .. }
            | Self::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}
