//! Contract gate: every request must match an operation in the API contract.
//!
//! Order per request:
//! 1. (method, path) lookup; no match -> 404, handler never runs
//! 2. bearer authentication when the operation declares security
//! 3. parameter and body validation; all violations reported together -> 400
//!
//! On success the principal (secured operations only) is placed in request
//! extensions for the handler, and the operation id is recorded on the request span.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::{Principal, TokenVerifier};
use crate::services::contract::{RouteContract, validate_body, validate_parameters};

#[derive(Clone)]
pub struct ContractGate {
    contract: Arc<RouteContract>,
    verifier: Option<Arc<TokenVerifier>>,
    body_limit: usize,
}

impl ContractGate {
    /// `verifier: None` disables authentication; secured operations are then served
    /// without a principal.
    pub fn new(
        contract: Arc<RouteContract>,
        verifier: Option<Arc<TokenVerifier>>,
        body_limit: usize,
    ) -> Self {
        Self {
            contract,
            verifier,
            body_limit,
        }
    }
}

pub fn apply(router: Router, gate: ContractGate) -> Router {
    router.layer(middleware::from_fn_with_state(gate, contract_gate))
}

async fn contract_gate(
    State(gate): State<ContractGate>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    let (operation, path_params) = gate
        .contract
        .find(&parts.method, parts.uri.path())
        .ok_or(AppError::RouteNotFound)?;
    tracing::Span::current().record("operation_id", operation.operation_id.as_str());

    // Principals only ever come from this gate.
    parts.extensions.remove::<Principal>();

    if operation.security_required
        && let Some(verifier) = &gate.verifier
    {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        match verifier.verify(authorization).await {
            Ok(principal) => {
                parts.extensions.insert(principal);
            }
            Err(err) => {
                tracing::warn!(
                    operation_id = %operation.operation_id,
                    error = err.code(),
                    "bearer authentication failed"
                );
                return Err(err.into());
            }
        }
    }

    let mut violations =
        validate_parameters(operation, &path_params, parts.uri.query(), &parts.headers);

    let bytes = axum::body::to_bytes(body, gate.body_limit)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;
    violations.extend(validate_body(operation, &parts.headers, &bytes));

    if !violations.is_empty() {
        tracing::debug!(
            operation_id = %operation.operation_id,
            violations = violations.len(),
            "request rejected by contract"
        );
        return Err(AppError::SchemaViolation(violations));
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Extension;
    use axum::http::{Method, StatusCode};
    use axum::routing::{get, post};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::services::auth::keyset::testing::StaticKeySource;
    use crate::services::auth::test_keys::{AUDIENCE, ISSUER, KID_A, claims, jwks, sign};
    use crate::services::auth::{KeySetCache, KeySetPolicy};

    const DOC: &str = r#"
openapi: 3.1.0
security:
  - bearerAuth: []
components:
  securitySchemes:
    bearerAuth: { type: http, scheme: bearer }
paths:
  /open:
    get:
      operationId: open
      security: []
      responses: { "200": { description: ok } }
  /items:
    post:
      operationId: createItem
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name: { type: string }
      responses: { "201": { description: created } }
"#;

    async fn verifier() -> Arc<TokenVerifier> {
        let keys = KeySetCache::connect(
            StaticKeySource::new(jwks(&[KID_A])),
            KeySetPolicy {
                ttl: Duration::from_secs(300),
                refresh_timeout: Duration::from_millis(200),
                min_refresh_interval: Duration::ZERO,
            },
        )
        .await
        .unwrap();
        Arc::new(TokenVerifier::new(keys, ISSUER, AUDIENCE))
    }

    fn app(verifier: Option<Arc<TokenVerifier>>, hits: Arc<AtomicUsize>) -> Router {
        let contract = Arc::new(RouteContract::from_yaml(DOC).unwrap());
        let open_hits = hits.clone();
        let router = Router::new()
            .route(
                "/open",
                get(move |principal: Option<Extension<Principal>>| async move {
                    open_hits.fetch_add(1, Ordering::SeqCst);
                    assert!(principal.is_none());
                    StatusCode::OK
                }),
            )
            .route(
                "/items",
                post(move |Extension(principal): Extension<Principal>, body: String| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let name = serde_json::from_str::<Value>(&body).unwrap()["name"].clone();
                    (StatusCode::CREATED, format!("{}:{}", principal.subject, name))
                }),
            );
        apply(router, ContractGate::new(contract, verifier, 1024))
    }

    fn items_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_is_404_before_anything_else() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = app(Some(verifier().await), hits.clone())
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"]["code"], "ROUTE_NOT_FOUND");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undeclared_method_is_404() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = app(None, hits.clone())
            .oneshot(Request::delete("/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn auth_runs_before_validation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let res = app(Some(verifier().await), hits.clone())
            .oneshot(items_request(None, "{}"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(res).await["error"]["code"],
            "MISSING_OR_MALFORMED_TOKEN"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authenticated_valid_request_reaches_handler_with_principal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exp = chrono::Utc::now().timestamp() + 300;
        let token = sign(KID_A, &claims("alice", exp));

        let res = app(Some(verifier().await), hits.clone())
            .oneshot(items_request(Some(&token), r#"{"name":"pen"}"#))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "alice:\"pen\"");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_body_is_400_with_violations() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exp = chrono::Utc::now().timestamp() + 300;
        let token = sign(KID_A, &claims("alice", exp));

        let res = app(Some(verifier().await), hits.clone())
            .oneshot(items_request(Some(&token), r#"{"name":5}"#))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(
            body["error"]["violations"],
            json!([{ "in": "body", "field": "name", "constraint": "type" }])
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_operation_never_sees_a_principal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exp = chrono::Utc::now().timestamp() + 300;
        let token = sign(KID_A, &claims("alice", exp));

        let res = app(Some(verifier().await), hits.clone())
            .oneshot(
                Request::get("/open")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let hits = Arc::new(AtomicUsize::new(0));
        let big = format!(r#"{{"name":"{}"}}"#, "x".repeat(4096));
        let res = app(None, hits)
            .oneshot(items_request(None, &big))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
