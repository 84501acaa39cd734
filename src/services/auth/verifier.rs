use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use thiserror::Error;

use super::discovery::same_issuer;
use super::keyset::{KeyLookupError, KeySetCache};
use super::principal::{Audience, Principal, TokenClaims};

/// Why a bearer token was refused. Every variant is a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("bearer token is missing or malformed")]
    MissingOrMalformedToken,
    #[error("token signing key is not recognised")]
    UnknownSigningKey,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token issuer is not accepted")]
    IssuerMismatch,
    #[error("token audience is not accepted")]
    AudienceMismatch,
    #[error("token has expired")]
    TokenExpired,
    #[error("signing keys are temporarily unavailable")]
    KeyFetchTimeout,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingOrMalformedToken => "MISSING_OR_MALFORMED_TOKEN",
            AuthError::UnknownSigningKey => "UNKNOWN_SIGNING_KEY",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::IssuerMismatch => "ISSUER_MISMATCH",
            AuthError::AudienceMismatch => "AUDIENCE_MISMATCH",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::KeyFetchTimeout => "KEY_FETCH_TIMEOUT",
        }
    }
}

const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::EdDSA,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Bearer token verifier.
///
/// Checks run in a fixed order and the first failure wins:
/// shape -> signing key -> signature -> issuer -> audience -> expiry.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Verify the raw `Authorization` header value.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        self.verify_at(authorization, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::MissingOrMalformedToken)?;

        let header =
            jsonwebtoken::decode_header(token).map_err(|_| AuthError::MissingOrMalformedToken)?;
        let kid = header
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::MissingOrMalformedToken)?;

        let key = self.keys.resolve(kid).await.map_err(|err| match err {
            KeyLookupError::Unknown => AuthError::UnknownSigningKey,
            KeyLookupError::Timeout => AuthError::KeyFetchTimeout,
        })?;

        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidSignature);
        }

        // Signature only; claim checks below keep their own order.
        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let mut claims = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::MissingOrMalformedToken,
                _ => AuthError::InvalidSignature,
            })?
            .claims;

        let issuer = claims.iss.take().unwrap_or_default();
        if !same_issuer(&issuer, &self.issuer) {
            return Err(AuthError::IssuerMismatch);
        }

        let audience = claims
            .aud
            .take()
            .map(Audience::into_vec)
            .ok_or(AuthError::AudienceMismatch)?;
        if !audience.iter().any(|a| a == &self.audience) {
            return Err(AuthError::AudienceMismatch);
        }

        let exp = claims.exp.ok_or(AuthError::MissingOrMalformedToken)?;
        if now.timestamp() >= exp {
            return Err(AuthError::TokenExpired);
        }
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or(AuthError::MissingOrMalformedToken)?;

        let subject = claims
            .sub
            .take()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingOrMalformedToken)?;

        Ok(Principal {
            subject,
            issuer,
            audience,
            expires_at,
            scopes: claims.scopes(),
            roles: claims.roles(),
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    let well_formed = !token.is_empty()
        && !token.contains(char::is_whitespace)
        && token.split('.').count() == 3;
    well_formed.then_some(token)
}
