/*
 * Responsibility
 * - GET /livez, /healthz: process is up (no dependency checks)
 * - GET /readyz: dependencies reachable, probed on every call
 */
use axum::{Json, extract::State};

use crate::{
    api::dto::health::StatusResponse,
    error::AppError,
    services::health::HealthStatus,
    state::AppState,
};

fn respond(status: HealthStatus) -> Result<Json<StatusResponse>, AppError> {
    if status.is_ok() {
        Ok(Json(StatusResponse::OK))
    } else {
        tracing::warn!(
            failed = ?status.failed_checks,
            passed = ?status.passed_checks,
            "not ready"
        );
        Err(AppError::DependencyUnavailable {
            failed_checks: status.failed_checks,
        })
    }
}

pub async fn livez(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    respond(state.health.liveness())
}

pub async fn healthz(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    respond(state.health.liveness())
}

pub async fn readyz(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    respond(state.health.readiness().await)
}
