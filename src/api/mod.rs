/*
 * Responsibility
 * - Business handlers and the dispatch table binding them to contract operations
 * - Validation/auth happen before any handler here runs (see middleware::contract)
 */
pub mod dto;
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::{Binding, dispatch_table};
