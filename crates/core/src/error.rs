use thiserror::Error;

/// Errors raised by the customer domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("validation failed for field '{field}': {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("{entity} not found with id '{id}'")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} already exists with {field} = '{value}'")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
}

impl DomainError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the offending field for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } | Self::AlreadyExists { field, .. } => Some(field),
            Self::NotFound { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
