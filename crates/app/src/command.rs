use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{error, info, warn};

use customer_crud_core::{
    command::{Command, CreateCustomerCommand, DeleteCustomerCommand, UpdateCustomerCommand},
    AggregateRoot, Customer, CustomerId, DomainError,
};
use customer_crud_storage::{Database, RepositoryError, WriteRepository};

use crate::projection::ProjectionTrigger;

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Created(Customer),
    Updated(Customer),
    Deleted(CustomerId),
}

/// Dispatches write-side commands to their handlers and commits the result.
#[derive(Clone)]
pub struct CommandExecutor {
    database: Database,
    projection: ProjectionTrigger,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl CommandExecutor {
    pub fn new(
        database: Database,
        projection: ProjectionTrigger,
        clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            database,
            projection,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Executes one command; the projection worker is nudged after every successful commit.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, CommandExecutorError> {
        let kind = command.kind();
        let target = command.customer_id();

        let result = match command {
            Command::Create(create) => self.handle_create(create).await,
            Command::Update(update) => self.handle_update(update).await,
            Command::Delete(delete) => self.handle_delete(delete).await,
        };

        match &result {
            Ok(outcome) => {
                counter!("customer_commands_total", "kind" => kind, "result" => "ok").increment(1);
                info!(
                    stage = "command",
                    kind,
                    customer_id = %outcome.customer_id(),
                    "command applied"
                );
                self.projection.notify();
            }
            Err(err) => {
                let label = err.label();
                counter!("customer_commands_total", "kind" => kind, "result" => label).increment(1);
                let customer_id = target.map(|id| id.to_string()).unwrap_or_default();
                if label == "error" {
                    error!(stage = "command", kind, %customer_id, error = %err, "command failed");
                } else {
                    warn!(
                        stage = "command",
                        kind,
                        %customer_id,
                        result = label,
                        error = %err,
                        "command rejected"
                    );
                }
            }
        }

        result
    }

    async fn handle_create(
        &self,
        command: CreateCustomerCommand,
    ) -> Result<CommandOutcome, CommandExecutorError> {
        let customer = Customer::create(
            &command.firstname,
            &command.lastname,
            &command.date_of_birth,
            &command.phone_number,
            &command.email,
            &command.bank_account_number,
            self.now(),
        )?;

        let mut repo = self.database.customer_writes();
        repo.add(customer.clone());
        repo.commit()
            .await
            .map_err(|err| already_exists(&customer, err))?;
        Ok(CommandOutcome::Created(customer))
    }

    async fn handle_update(
        &self,
        command: UpdateCustomerCommand,
    ) -> Result<CommandOutcome, CommandExecutorError> {
        let mut repo = self.database.customer_writes();
        let mut customer = repo
            .find(&command.id)
            .await?
            .ok_or(CommandExecutorError::NotFound(command.id))?;

        let changed = customer.update_contact(
            command.phone_number.as_deref(),
            command.email.as_deref(),
            self.now(),
        )?;
        if changed {
            repo.update(customer.clone());
            repo.commit()
                .await
                .map_err(|err| already_exists(&customer, err))?;
        }
        Ok(CommandOutcome::Updated(customer))
    }

    async fn handle_delete(
        &self,
        command: DeleteCustomerCommand,
    ) -> Result<CommandOutcome, CommandExecutorError> {
        let mut repo = self.database.customer_writes();
        let mut customer = repo
            .find(&command.id)
            .await?
            .ok_or(CommandExecutorError::NotFound(command.id))?;

        customer.delete(self.now())?;
        repo.remove(customer);
        repo.commit().await?;
        Ok(CommandOutcome::Deleted(command.id))
    }
}

/// Translates a unique-index violation into the domain conflict for the column that collided.
fn already_exists(customer: &Customer, err: RepositoryError) -> CommandExecutorError {
    let (entity, constraint) = match err {
        RepositoryError::UniqueViolation { entity, constraint } => (entity, constraint),
        other => return other.into(),
    };
    let first_column = constraint
        .split(',')
        .next()
        .and_then(|column| column.trim().rsplit('.').next())
        .unwrap_or_default();
    let (field, value) = match first_column {
        "email" => ("email", customer.email().to_string()),
        "bank_account_number" => (
            "bank_account_number",
            customer.bank_account_number().to_string(),
        ),
        "firstname" | "lastname" | "date_of_birth" => (
            "identity",
            format!(
                "{} {} {}",
                customer.firstname(),
                customer.lastname(),
                customer.date_of_birth()
            ),
        ),
        _ => ("id", customer.id().to_string()),
    };
    DomainError::AlreadyExists {
        entity,
        field,
        value,
    }
    .into()
}

impl CommandOutcome {
    pub fn customer_id(&self) -> CustomerId {
        match self {
            Self::Created(customer) | Self::Updated(customer) => *customer.id(),
            Self::Deleted(id) => *id,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandExecutorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("customer not found with id '{0}'")]
    NotFound(CustomerId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CommandExecutorError {
    /// Metric label for the failure class.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Validation { .. }) => "invalid",
            Self::Domain(DomainError::NotFound { .. })
            | Self::NotFound(_)
            | Self::Repository(RepositoryError::NotFound { .. }) => "not_found",
            Self::Domain(DomainError::AlreadyExists { .. }) => "conflict",
            Self::Repository(_) => "error",
        }
    }
}
