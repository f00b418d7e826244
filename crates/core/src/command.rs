use serde::{Deserialize, Serialize};

use crate::customer::CustomerId;

/// Write-side commands dispatched by the application's command executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Create(CreateCustomerCommand),
    Update(UpdateCustomerCommand),
    Delete(DeleteCustomerCommand),
}

impl Command {
    /// Returns the label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }

    /// Returns the targeted customer when the command addresses an existing one.
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            Self::Create(_) => None,
            Self::Update(update) => Some(update.id),
            Self::Delete(delete) => Some(delete.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerCommand {
    pub firstname: String,
    pub lastname: String,
    pub date_of_birth: String,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomerCommand {
    pub id: CustomerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCustomerCommand {
    pub id: CustomerId,
}
