//! CORS policy for browser clients.
//!
//! Note:
//! - CORS is enforced by browsers. Native mobile apps and server-to-server calls are not
//!   restricted by CORS.
//! - Preflights (`OPTIONS`) are answered by the layer and never reach the contract gate.
//!
//! Policy:
//! - Origins: exact (`https://app.example.com`), single wildcard
//!   (`https://*.example.com`) or `*`.
//! - A disallowed origin gets no `Access-Control-Allow-Origin`; the browser then blocks the call.
//! - `*` combined with credentials mirrors the caller's origin, since browsers reject
//!   `Access-Control-Allow-Origin: *` on credentialed requests.

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, request::Parts},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginPattern {
    Any,
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl OriginPattern {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "*" {
            return Some(Self::Any);
        }
        match raw.split_once('*') {
            None => Some(Self::Exact(raw)),
            Some((_, suffix)) if suffix.contains('*') => None,
            Some((prefix, suffix)) => Some(Self::Wildcard {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => exact == origin,
            Self::Wildcard { prefix, suffix } => {
                origin.len() > prefix.len() + suffix.len()
                    && origin.starts_with(prefix.as_str())
                    && origin.ends_with(suffix.as_str())
            }
        }
    }
}

/// Validated CORS settings. [`CorsPolicy::layer`] turns them into a `CorsLayer`.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<OriginPattern>,
    /// `None` means `*`.
    methods: Option<Vec<Method>>,
    headers: Option<Vec<HeaderName>>,
    exposed: Vec<HeaderName>,
    allow_credentials: bool,
    max_age: Duration,
}

fn is_wildcard(items: &[String]) -> bool {
    items.iter().any(|i| i.trim() == "*")
}

fn header_names(items: &[String], key: &'static str) -> Result<Vec<HeaderName>, &'static str> {
    items
        .iter()
        .map(|h| HeaderName::from_bytes(h.trim().as_bytes()).map_err(|_| key))
        .collect()
}

impl CorsPolicy {
    /// Build a policy from configured lists. The error names the offending setting.
    pub fn new(
        origins: Vec<String>,
        methods: Vec<String>,
        headers: Vec<String>,
        exposed: Vec<String>,
        allow_credentials: bool,
        max_age: Duration,
    ) -> Result<Self, &'static str> {
        let origins = origins
            .iter()
            .map(|o| OriginPattern::parse(o))
            .collect::<Option<Vec<_>>>()
            .ok_or("CORS_ALLOWED_ORIGINS")?;

        let methods = if is_wildcard(&methods) {
            None
        } else {
            Some(
                methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                            .map_err(|_| "CORS_ALLOWED_METHODS")
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };

        let headers = if is_wildcard(&headers) {
            None
        } else {
            Some(header_names(&headers, "CORS_ALLOWED_HEADERS")?)
        };

        // Browsers ignore a wildcard expose list on credentialed responses.
        if allow_credentials && is_wildcard(&exposed) {
            return Err("CORS_EXPOSED_HEADERS");
        }
        let exposed = header_names(&exposed, "CORS_EXPOSED_HEADERS")?;

        Ok(Self {
            origins,
            methods,
            headers,
            exposed,
            allow_credentials,
            max_age,
        })
    }

    fn allow_origin(&self) -> AllowOrigin {
        if self.origins.contains(&OriginPattern::Any) {
            return if self.allow_credentials {
                AllowOrigin::mirror_request()
            } else {
                Any.into()
            };
        }

        let patterns = self.origins.clone();
        AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .map(|o| {
                    let o = o.to_ascii_lowercase();
                    patterns.iter().any(|p| p.matches(&o))
                })
                .unwrap_or(false)
        })
    }

    fn allow_methods(&self) -> AllowMethods {
        match &self.methods {
            Some(list) => list.clone().into(),
            None if self.allow_credentials => AllowMethods::mirror_request(),
            None => Any.into(),
        }
    }

    fn allow_headers(&self) -> AllowHeaders {
        match &self.headers {
            Some(list) => list.clone().into(),
            None if self.allow_credentials => AllowHeaders::mirror_request(),
            None => Any.into(),
        }
    }

    pub fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_origin(self.allow_origin())
            .allow_methods(self.allow_methods())
            .allow_headers(self.allow_headers())
            .allow_credentials(self.allow_credentials)
            .max_age(self.max_age);

        if self.exposed.is_empty() {
            layer
        } else {
            layer.expose_headers(self.exposed.clone())
        }
    }
}

/// Apply the CORS policy to the given Router.
pub fn apply(router: Router, policy: &CorsPolicy) -> Router {
    router.layer(policy.layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::Request,
        http::{StatusCode, header},
        response::Response,
        routing::get,
    };
    use tower::ServiceExt;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn policy(origins: &[&str], credentials: bool) -> CorsPolicy {
        CorsPolicy::new(
            strings(origins),
            strings(&["GET", "POST"]),
            strings(&["Authorization", "Content-Type"]),
            strings(&["Link"]),
            credentials,
            Duration::from_secs(300),
        )
        .unwrap()
    }

    fn app(policy: CorsPolicy) -> Router {
        let router = Router::new().route(
            "/users",
            get(|| async { StatusCode::OK }).post(|| async { StatusCode::BAD_REQUEST }),
        );
        apply(router, &policy)
    }

    fn preflight(origin: &str, method: &str, headers: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/users")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, method);
        if let Some(h) = headers {
            req = req.header(header::ACCESS_CONTROL_REQUEST_HEADERS, h);
        }
        req.body(Body::empty()).unwrap()
    }

    /// Comma-separated header value as a lowercase list.
    fn list(res: &Response, name: HeaderName) -> Vec<String> {
        res.headers()[name]
            .to_str()
            .unwrap()
            .split(',')
            .map(|v| v.trim().to_ascii_lowercase())
            .collect()
    }

    #[test]
    fn origin_patterns() {
        let p = OriginPattern::parse("https://*.Example.com").unwrap();
        assert!(p.matches("https://app.example.com"));
        assert!(!p.matches("https://.example.com"));
        assert!(!p.matches("http://app.example.com"));
        assert!(!p.matches("https://example.com"));
        assert!(OriginPattern::parse("https://*.*.example.com").is_none());
    }

    #[test]
    fn rejects_bad_settings_by_name() {
        let build = |origins: &[&str], headers: &[&str], exposed: &[&str]| {
            CorsPolicy::new(
                strings(origins),
                strings(&["GET"]),
                strings(headers),
                strings(exposed),
                true,
                Duration::ZERO,
            )
            .unwrap_err()
        };

        assert_eq!(build(&["https://*.*.x"], &[], &[]), "CORS_ALLOWED_ORIGINS");
        assert_eq!(build(&["*"], &["bad header"], &[]), "CORS_ALLOWED_HEADERS");
        assert_eq!(build(&["*"], &[], &["*"]), "CORS_EXPOSED_HEADERS");
    }

    #[tokio::test]
    async fn allowed_preflight_gets_configured_headers() {
        let res = app(policy(&["https://app.example.com"], true))
            .oneshot(preflight(
                "https://app.example.com",
                "POST",
                Some("authorization, content-type"),
            ))
            .await
            .unwrap();

        assert!(res.status().is_success());
        let h = res.headers();
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(h[header::ACCESS_CONTROL_MAX_AGE], "300");
        assert_eq!(list(&res, header::ACCESS_CONTROL_ALLOW_METHODS), ["get", "post"]);
        assert_eq!(
            list(&res, header::ACCESS_CONTROL_ALLOW_HEADERS),
            ["authorization", "content-type"]
        );
    }

    #[tokio::test]
    async fn disallowed_origin_gets_no_allow_origin() {
        let app = app(policy(&["https://*.example.com"], true));

        for origin in ["https://evil.test", "https://example.com", "http://app.example.com"] {
            let res = app.clone().oneshot(preflight(origin, "GET", None)).await.unwrap();
            assert!(!res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        }
    }

    #[tokio::test]
    async fn any_origin_without_credentials_is_star() {
        let res = app(policy(&["*"], false))
            .oneshot(preflight("https://whoever.test", "GET", None))
            .await
            .unwrap();
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(!res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }

    #[tokio::test]
    async fn any_origin_with_credentials_echoes() {
        let res = app(policy(&["*"], true))
            .oneshot(preflight("https://whoever.test", "GET", None))
            .await
            .unwrap();
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://whoever.test"
        );
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn wildcard_lists_with_credentials_mirror_the_request() {
        let policy = CorsPolicy::new(
            strings(&["*"]),
            strings(&["*"]),
            strings(&["*"]),
            strings(&[]),
            true,
            Duration::from_secs(60),
        )
        .unwrap();

        let res = app(policy)
            .oneshot(preflight("https://whoever.test", "PATCH", Some("x-custom")))
            .await
            .unwrap();
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "PATCH");
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
        assert!(!res.headers().contains_key(header::ACCESS_CONTROL_EXPOSE_HEADERS));
    }

    #[tokio::test]
    async fn error_responses_still_carry_cors_headers() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::ORIGIN, "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let res = app(policy(&["https://*.example.com"], false))
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(list(&res, header::ACCESS_CONTROL_EXPOSE_HEADERS), ["link"]);
        assert!(list(&res, header::VARY).contains(&"origin".to_string()));
    }

    #[tokio::test]
    async fn request_without_origin_gets_no_allow_origin() {
        let res = app(policy(&["https://app.example.com"], true))
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
