//! Customer domain: the aggregate root, its domain events, the write-side
//! commands and the pure read-model projector.

pub mod aggregate;
pub mod command;
pub mod customer;
pub mod error;
pub mod events;
pub mod projector;

pub use aggregate::{AggregateRoot, DomainEvent};
pub use customer::{Customer, CustomerId};
pub use error::DomainError;
pub use events::{CustomerCreatedDomainEvent, CustomerDomainEvent};
