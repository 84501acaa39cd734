/*
 * Responsibility
 * - /users handlers: list (paginated), get, create
 * - Input shape is already enforced by the contract gate; storage errors become 500
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    api::dto::users::{CreateUserRequest, PageRequest, PaginationMetadata, UserPage, UserResponse},
    api::extractors::CurrentPrincipal,
    error::AppError,
    middleware::request_id::CorrelationId,
    state::AppState,
};

pub async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<PageRequest>,
) -> Result<Json<UserPage>, AppError> {
    let page = query
        .resolve()
        .map_err(|msg| AppError::bad_request("INVALID_PAGINATION", msg))?;

    let total_records = state.users.count().await?;
    let rows = state.users.list(page.limit, page.offset()).await?;

    Ok(Json(UserPage {
        data: rows.into_iter().map(UserResponse::from).collect(),
        pagination: PaginationMetadata::new(page, total_records),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let row = state
        .users
        .get(user_id)
        .await?
        .ok_or(AppError::not_found("user"))?;

    Ok(Json(row.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    principal: Option<CurrentPrincipal>,
    correlation_id: CorrelationId,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let row = state
        .users
        .create(req.first_name.trim(), req.last_name.trim(), req.email.trim())
        .await?;

    tracing::info!(
        user_id = %row.user_id,
        created_by = principal.as_ref().map(|CurrentPrincipal(p)| p.subject.as_str()).unwrap_or("-"),
        request_id = %correlation_id,
        "user created"
    );

    Ok((StatusCode::CREATED, Json(row.into())))
}
