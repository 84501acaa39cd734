//! Correlation id per request (`x-request-id`).
//!
//! - An inbound id is kept as-is, otherwise a UUIDv4 is generated.
//! - The id is echoed on the response and handed to the access logger and handlers.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header::HeaderName};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Opaque per-request identifier. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Id assigned by the request-id layer, or a fresh one when the layer is absent.
    pub fn from_request(req: &Request<Body>) -> Self {
        req.extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.into()))
            .unwrap_or_else(Self::generate)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assign (or keep) `x-request-id` and copy it onto the response.
pub fn apply(router: Router) -> Router {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(header.clone(), MakeRequestUuid))
            .layer(PropagateRequestIdLayer::new(header)),
    )
}
