use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use customer_crud_core::{
    command::{Command, DeleteCustomerCommand},
    CustomerId,
};
use customer_crud_storage::Database;

use crate::command::{CommandExecutor, CommandOutcome};
use crate::dto::{CreateCustomerDto, CustomerDto, UpdateCustomerDto};
use crate::problem::ProblemResponse;
use crate::projection::ProjectionWorker;
use crate::{query, telemetry};

const CUSTOMERS_PATH: &str = "/api/v1/customers";

/// Shared handles wired once at startup.
#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    read_db: Database,
    command_executor: CommandExecutor,
    projection: ProjectionWorker,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        write_db: Database,
        read_db: Database,
        projection_interval: Duration,
    ) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        let projection = ProjectionWorker::new(&write_db, read_db.clone(), projection_interval);
        let command_executor = CommandExecutor::new(write_db, projection.trigger(), clock);
        Self {
            metrics,
            read_db,
            command_executor,
            projection,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn read_db(&self) -> &Database {
        &self.read_db
    }

    pub fn command_executor(&self) -> &CommandExecutor {
        &self.command_executor
    }

    pub fn projection(&self) -> &ProjectionWorker {
        &self.projection
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(CUSTOMERS_PATH, get(list_customers).post(create_customer))
        .route(
            "/api/v1/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Debug, Deserialize)]
struct CustomerQuery {
    #[serde(default)]
    email: Option<String>,
}

async fn list_customers(
    State(state): State<AppState>,
    query: Result<Query<CustomerQuery>, QueryRejection>,
) -> Result<Json<Vec<CustomerDto>>, ProblemResponse> {
    let Query(query) = query.inspect_err(|_| record_query("list", "invalid"))?;
    let rows = query::list_customers(state.read_db(), query.email.as_deref())
        .await
        .inspect_err(|_| record_query("list", "error"))?;
    record_query("list", "ok");
    Ok(Json(rows.into_iter().map(CustomerDto::from).collect()))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<CustomerDto>, ProblemResponse> {
    let id = parse_id(&raw_id)?;
    let row = query::find_customer(state.read_db(), &id)
        .await
        .inspect_err(|_| record_query("get", "error"))?;
    match row {
        Some(row) => {
            record_query("get", "ok");
            Ok(Json(CustomerDto::from(row)))
        }
        None => {
            record_query("get", "not_found");
            Err(ProblemResponse::not_found(format!(
                "customer not found with id '{id}'"
            )))
        }
    }
}

async fn create_customer(
    State(state): State<AppState>,
    payload: Result<Json<CreateCustomerDto>, JsonRejection>,
) -> Result<Response, ProblemResponse> {
    let Json(dto) = payload?;
    let outcome = state
        .command_executor()
        .execute(Command::Create(dto.into()))
        .await?;
    let CommandOutcome::Created(customer) = outcome else {
        return Err(ProblemResponse::internal());
    };

    let body = CustomerDto::from(&customer);
    let location = format!("{CUSTOMERS_PATH}/{}", body.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(body),
    )
        .into_response())
}

async fn update_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<UpdateCustomerDto>, JsonRejection>,
) -> Result<Json<CustomerDto>, ProblemResponse> {
    let id = parse_id(&raw_id)?;
    let Json(dto) = payload?;
    let command = dto.into_command(id)?;
    let outcome = state
        .command_executor()
        .execute(Command::Update(command))
        .await?;
    let CommandOutcome::Updated(customer) = outcome else {
        return Err(ProblemResponse::internal());
    };
    Ok(Json(CustomerDto::from(&customer)))
}

async fn delete_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    let id = parse_id(&raw_id)?;
    state
        .command_executor()
        .execute(Command::Delete(DeleteCustomerCommand { id }))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(raw: &str) -> Result<CustomerId, ProblemResponse> {
    raw.parse::<CustomerId>()
        .map_err(|_| ProblemResponse::validation("id", format!("'{raw}' is not a valid customer id")))
}

fn record_query(kind: &'static str, result: &'static str) {
    counter!("customer_queries_total", "kind" => kind, "result" => result).increment(1);
}
