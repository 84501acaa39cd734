//! OpenID Connect discovery: find the provider's JWKS endpoint at startup.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("discovery request to {0} timed out")]
    Timeout(String),
    #[error("provider reports issuer `{reported}`, expected `{expected}`")]
    IssuerMismatch { expected: String, reported: String },
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    jwks_uri: String,
}

pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// Issuers compare equal regardless of a trailing `/`.
pub fn same_issuer(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Fetch provider metadata for `issuer` and return its `jwks_uri`.
pub async fn discover_jwks_uri(
    client: &reqwest::Client,
    issuer: &str,
    timeout: Duration,
) -> Result<String, DiscoveryError> {
    let url = discovery_url(issuer);
    let request_error = |e: reqwest::Error| DiscoveryError::Request {
        url: url.clone(),
        reason: e.to_string(),
    };

    let fetch = async {
        client
            .get(&url)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .json::<ProviderMetadata>()
            .await
            .map_err(request_error)
    };

    let metadata = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| DiscoveryError::Timeout(url.clone()))??;

    if !same_issuer(&metadata.issuer, issuer) {
        return Err(DiscoveryError::IssuerMismatch {
            expected: issuer.to_string(),
            reported: metadata.issuer,
        });
    }

    tracing::info!(jwks_uri = %metadata.jwks_uri, "oidc discovery complete");
    Ok(metadata.jwks_uri)
}
