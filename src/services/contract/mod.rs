/*
 * Responsibility
 * - Contract-first request gate core: route table + parameter/body validation
 * - No axum middleware here (see middleware::contract); pure and testable
 */
mod route_contract;
mod template;
pub(crate) mod types;
mod validate;

pub use route_contract::RouteContract;
pub use types::{ContractError, FieldViolation};
pub use validate::{validate_body, validate_parameters};

/// The service's own API definition, compiled into the binary.
pub const API_CONTRACT: &str = include_str!("../../../openapi/api.yaml");
