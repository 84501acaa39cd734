/*
 * Responsibility
 * - Application-wide AppError (what the caller is allowed to see)
 * - IntoResponse: HTTP status + JSON error body
 * - Conversions from repo / auth errors so handlers and gates can use `?`
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::repos::error::RepoError;
use crate::services::auth::AuthError;
use crate::services::contract::FieldViolation;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessFailureBody {
    pub failed_checks: Vec<String>,
    pub successful_checks: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("route not found")]
    RouteNotFound,
    #[error("request does not match the API contract")]
    SchemaViolation(Vec<FieldViolation>),
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("not found: {resource}")]
    NotFound { resource: &'static str },
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("request timed out")]
    RequestTimeout,
    #[error("dependencies unavailable: {failed_checks:?}")]
    DependencyUnavailable { failed_checks: Vec<String> },
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound | AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::SchemaViolation(_) | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Readiness failures use the probe body shape, not the error envelope.
        if let AppError::DependencyUnavailable { failed_checks } = self {
            let body = ReadinessFailureBody {
                failed_checks,
                successful_checks: Vec::new(),
            };
            return (status, Json(body)).into_response();
        }

        let (code, message, violations) = match self {
            AppError::RouteNotFound => ("ROUTE_NOT_FOUND", "route not found".into(), Vec::new()),
            AppError::SchemaViolation(violations) => (
                "SCHEMA_VIOLATION",
                "request does not match the API contract".into(),
                violations,
            ),
            AppError::Unauthorized(err) => (err.code(), err.to_string(), Vec::new()),
            AppError::BadRequest { code, message } => (code, message, Vec::new()),
            AppError::NotFound { resource } => {
                ("NOT_FOUND", format!("{resource} not found."), Vec::new())
            }
            AppError::PayloadTooLarge => (
                "PAYLOAD_TOO_LARGE",
                "request body too large".into(),
                Vec::new(),
            ),
            AppError::RequestTimeout => ("REQUEST_TIMEOUT", "request timed out".into(), Vec::new()),
            AppError::DependencyUnavailable { .. } | AppError::Internal => (
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
                Vec::new(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                violations,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        tracing::error!(error = ?e, "storage failure");
        match e {
            RepoError::Db(_) => AppError::Internal,
        }
    }
}
