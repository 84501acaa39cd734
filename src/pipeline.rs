/*
 * Responsibility
 * - Cross-check the dispatch table against the route contract (startup failure on drift)
 * - Compose the middleware chain around the handlers, outermost first:
 *     request id -> access log -> security headers -> CORS -> panic recovery
 *     -> HTTP limits -> contract gate (auth + validation) -> handler
 */
use std::sync::Arc;

use axum::Router;

use crate::api::Binding;
use crate::error::AppError;
use crate::middleware::access_log::{self, AccessLogger};
use crate::middleware::contract::{self, ContractGate};
use crate::middleware::cors::{self, CorsPolicy};
use crate::middleware::http::{self, HttpLimits};
use crate::middleware::{recovery, request_id, security_headers};
use crate::services::auth::TokenVerifier;
use crate::services::contract::{ContractError, RouteContract};
use crate::state::AppState;

pub struct PipelineSettings {
    pub cors: CorsPolicy,
    pub limits: HttpLimits,
    /// `None` serves secured operations without authentication.
    pub verifier: Option<Arc<TokenVerifier>>,
    pub access_logger: AccessLogger,
}

/// Every contract operation needs exactly one binding with the same method and path,
/// and every binding must name a contract operation.
pub fn check_bindings(contract: &RouteContract, table: &[Binding]) -> Result<(), ContractError> {
    for binding in table {
        let operation = contract
            .get(binding.operation_id)
            .ok_or_else(|| ContractError::UnknownHandler(binding.operation_id.to_string()))?;

        if operation.method != binding.method || operation.template.as_str() != binding.path {
            return Err(ContractError::HandlerMismatch {
                operation_id: binding.operation_id.to_string(),
                bound: format!("{} {}", binding.method, binding.path),
                declared: format!("{} {}", operation.method, operation.template.as_str()),
            });
        }
    }

    if let Some(missing) = contract
        .operations()
        .iter()
        .find(|op| !table.iter().any(|b| b.operation_id == op.operation_id))
    {
        return Err(ContractError::MissingHandler(missing.operation_id.clone()));
    }
    Ok(())
}

pub fn compose(
    state: AppState,
    contract: Arc<RouteContract>,
    table: Vec<Binding>,
    settings: PipelineSettings,
) -> Result<Router, ContractError> {
    check_bindings(&contract, &table)?;

    let router = table
        .into_iter()
        .fold(Router::new(), |router, binding| {
            router.route(binding.path, binding.handler)
        })
        .fallback(|| async { AppError::RouteNotFound })
        .with_state(state);

    let gate = ContractGate::new(contract, settings.verifier, settings.limits.body_limit);

    // Each apply wraps everything applied before it.
    let router = contract::apply(router, gate);
    let router = http::apply(router, settings.limits);
    let router = recovery::apply(router);
    let router = cors::apply(router, &settings.cors);
    let router = security_headers::apply(router);
    let router = access_log::apply(router, settings.access_logger);
    Ok(request_id::apply(router))
}
