use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use customer_crud_core::DomainError;
use customer_crud_storage::RepositoryError;

use crate::command::CommandExecutorError;
use crate::query::QueryError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

/// RFC 7807 error body returned by every API handler.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
                field: None,
            },
        }
    }

    pub fn validation<S: Into<String>>(field: &'static str, detail: S) -> Self {
        let mut problem = Self::new(StatusCode::BAD_REQUEST, "validation_failed", detail);
        problem.body.field = Some(field);
        problem
    }

    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    pub fn conflict<S: Into<String>>(field: &'static str, detail: S) -> Self {
        let mut problem = Self::new(StatusCode::CONFLICT, "already_exists", detail);
        problem.body.field = Some(field);
        problem
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "an unexpected error occurred",
        )
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<CommandExecutorError> for ProblemResponse {
    fn from(err: CommandExecutorError) -> Self {
        match err {
            CommandExecutorError::Domain(DomainError::Validation { field, reason }) => {
                Self::validation(field, format!("{field}: {reason}"))
            }
            CommandExecutorError::Domain(DomainError::AlreadyExists { field, .. }) => {
                Self::conflict(field, err.to_string())
            }
            CommandExecutorError::Domain(DomainError::NotFound { .. })
            | CommandExecutorError::NotFound(_)
            | CommandExecutorError::Repository(RepositoryError::NotFound { .. }) => {
                Self::not_found(err.to_string())
            }
            CommandExecutorError::Repository(_) => Self::internal(),
        }
    }
}

impl From<QueryError> for ProblemResponse {
    fn from(err: QueryError) -> Self {
        error!(stage = "api", error = %err, "customer query failed");
        Self::internal()
    }
}

impl From<JsonRejection> for ProblemResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_body",
            rejection.body_text(),
        )
    }
}

impl From<QueryRejection> for ProblemResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
    }
}
