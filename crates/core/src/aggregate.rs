use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Event recorded by an aggregate and appended to the event log on commit.
pub trait DomainEvent: fmt::Debug + Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Canonical event type stored alongside the payload.
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Authoritative domain object owning its invariants and pending events.
pub trait AggregateRoot: fmt::Debug + Send + Sync {
    type Id: fmt::Display + Clone + PartialEq + Send + Sync;
    type Event: DomainEvent;

    /// Name stored in the event log's `aggregate_type` column.
    const AGGREGATE_TYPE: &'static str;

    fn id(&self) -> &Self::Id;

    /// Events recorded since the aggregate was created or loaded.
    fn pending_events(&self) -> &[Self::Event];

    /// Drains the pending events, leaving the aggregate clean.
    fn take_events(&mut self) -> Vec<Self::Event>;
}
