use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Authenticated caller, built only by `TokenVerifier` and attached to the
/// request for the lifetime of that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
}

/// Claims as they appear on the wire. Everything is optional here; the
/// verifier decides which absences are fatal.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

// `aud` is either a string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(a) => vec![a],
            Audience::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenClaims {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Top-level `roles`, falling back to Keycloak's `realm_access.roles`.
    pub fn roles(&self) -> Vec<String> {
        match (&self.roles, &self.realm_access) {
            (Some(roles), _) => roles.clone(),
            (None, Some(realm)) => realm.roles.clone(),
            (None, None) => Vec::new(),
        }
    }
}
