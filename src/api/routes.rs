/*
 * Responsibility
 * - Dispatch table: operationId -> (method, path, handler)
 * - Paths use the contract's template syntax; pipeline::compose cross-checks both sides
 */
use axum::{
    http::Method,
    routing::{MethodRouter, get, post},
};

use crate::api::handlers::{health, users};
use crate::state::AppState;

pub struct Binding {
    pub operation_id: &'static str,
    pub method: Method,
    pub path: &'static str,
    pub handler: MethodRouter<AppState>,
}

impl Binding {
    pub fn new(
        operation_id: &'static str,
        method: Method,
        path: &'static str,
        handler: MethodRouter<AppState>,
    ) -> Self {
        Self {
            operation_id,
            method,
            path,
            handler,
        }
    }
}

pub fn dispatch_table() -> Vec<Binding> {
    vec![
        Binding::new("getHealthz", Method::GET, "/healthz", get(health::healthz)),
        Binding::new("getLivez", Method::GET, "/livez", get(health::livez)),
        Binding::new("getReadyz", Method::GET, "/readyz", get(health::readyz)),
        Binding::new("getUsers", Method::GET, "/users", get(users::get_users)),
        Binding::new("createUser", Method::POST, "/users", post(users::create_user)),
        Binding::new("getUser", Method::GET, "/users/{userId}", get(users::get_user)),
    ]
}
