use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use customer_crud_core::{
    command::{CreateCustomerCommand, UpdateCustomerCommand},
    projector::CustomerReadModel,
    AggregateRoot, Customer, CustomerId,
};

use crate::problem::ProblemResponse;

/// Request body of `POST /api/v1/customers`.
///
/// Missing fields deserialize as empty strings so the domain reports them by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCustomerDto {
    #[serde(alias = "Firstname")]
    pub firstname: String,
    #[serde(alias = "Lastname")]
    pub lastname: String,
    #[serde(alias = "DateOfBirth")]
    pub date_of_birth: String,
    #[serde(alias = "PhoneNumber")]
    pub phone_number: String,
    #[serde(alias = "Email")]
    pub email: String,
    #[serde(alias = "BankAccountNumber")]
    pub bank_account_number: String,
}

impl From<CreateCustomerDto> for CreateCustomerCommand {
    fn from(dto: CreateCustomerDto) -> Self {
        Self {
            firstname: dto.firstname,
            lastname: dto.lastname,
            date_of_birth: dto.date_of_birth,
            phone_number: dto.phone_number,
            email: dto.email,
            bank_account_number: dto.bank_account_number,
        }
    }
}

/// Request body of `PUT /api/v1/customers/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerDto {
    #[serde(default, alias = "Id")]
    pub id: Option<CustomerId>,
    #[serde(default, alias = "PhoneNumber")]
    pub phone_number: Option<String>,
    #[serde(default, alias = "Email")]
    pub email: Option<String>,
}

impl UpdateCustomerDto {
    /// Builds the update command for the customer addressed by the path.
    ///
    /// A body id, when present, must match the path id.
    pub fn into_command(self, path_id: CustomerId) -> Result<UpdateCustomerCommand, ProblemResponse> {
        if let Some(body_id) = self.id {
            if body_id != path_id {
                return Err(ProblemResponse::validation(
                    "id",
                    format!("body id '{body_id}' does not match path id '{path_id}'"),
                ));
            }
        }

        Ok(UpdateCustomerCommand {
            id: path_id,
            phone_number: self.phone_number,
            email: self.email,
        })
    }
}

/// Customer representation returned by every read and write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDto {
    pub id: CustomerId,
    pub firstname: String,
    pub lastname: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
}

impl From<CustomerReadModel> for CustomerDto {
    fn from(model: CustomerReadModel) -> Self {
        Self {
            id: model.id,
            firstname: model.firstname,
            lastname: model.lastname,
            date_of_birth: model.date_of_birth,
            phone_number: model.phone_number,
            email: model.email,
            bank_account_number: model.bank_account_number,
        }
    }
}

impl From<&Customer> for CustomerDto {
    fn from(customer: &Customer) -> Self {
        Self {
            id: *customer.id(),
            firstname: customer.firstname().to_string(),
            lastname: customer.lastname().to_string(),
            date_of_birth: customer.date_of_birth(),
            phone_number: customer.phone_number().to_string(),
            email: customer.email().to_string(),
            bank_account_number: customer.bank_account_number().to_string(),
        }
    }
}
