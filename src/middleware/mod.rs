/*
 * Responsibility
 * - Cross-cutting request gates, each exposed as `apply(router, ...) -> Router`
 * - Ordering is decided in pipeline::compose, not here
 */
pub mod access_log;
pub mod contract;
pub mod cors;
pub mod http;
pub mod recovery;
pub mod request_id;
pub mod security_headers;
