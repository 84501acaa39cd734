/*
 * Responsibility
 * - Read process configuration from the environment (.env is honoured)
 * - Validate values up front (missing/invalid -> startup failure)
 * - Expose typed policy structs (CORS, OIDC, timeouts) to the wiring code
 */
use std::net::SocketAddr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

use crate::middleware::cors::CorsPolicy;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: String,
    pub local: bool,
    pub client_cert: String,
    pub client_key: String,
    pub root_cert: String,

    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    /// Build sqlx connect options. `DATABASE_URL` wins when present.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return url
                .parse::<PgConnectOptions>()
                .map_err(|_| ConfigError::Invalid("DATABASE_URL"));
        }

        let ssl_mode = self
            .ssl_mode
            .parse::<PgSslMode>()
            .map_err(|_| ConfigError::Invalid("PG_SSLMODE"))?;

        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(ssl_mode);

        // Local development talks to a plain socket; everything else uses mTLS.
        if self.local {
            Ok(options)
        } else {
            Ok(options
                .ssl_client_cert(&self.client_cert)
                .ssl_client_key(&self.client_key)
                .ssl_root_cert(&self.root_cert))
        }
    }
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub enabled: bool,
    pub issuer: String,
    pub audience: String,
    pub refresh_timeout: Duration,
    pub cache_ttl: Duration,
    pub min_refresh_interval: Duration,
}

pub struct Config {
    pub addr: SocketAddr,
    pub debug_mode: bool,

    pub database: DatabaseConfig,
    pub cors: CorsPolicy,
    pub oidc: OidcConfig,

    pub health_probe_timeout: Duration,
    pub request_timeout: Duration,
    pub request_body_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads through `lookup`, so tests don't touch
    /// the process environment.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let port: u16 = vars.parsed("PORT")?.unwrap_or(8080);
        if port == 0 {
            return Err(ConfigError::Invalid("PORT"));
        }
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let debug_mode = vars.flag("DEBUG_MODE", false)?;

        let database = DatabaseConfig {
            url: vars.string("DATABASE_URL"),
            host: vars.string_or("PG_HOST", "localhost"),
            port: vars.parsed("PG_PORT")?.unwrap_or(5432),
            database: vars.string_or("PG_DB", "orbis"),
            user: vars.string_or("PG_USER", "user"),
            password: vars.string_or("PG_PASSWORD", "password"),
            ssl_mode: vars.string_or("PG_SSLMODE", "verify-full"),
            local: vars.flag("PG_LOCAL", false)?,
            client_cert: vars.string_or("PG_CLIENT_CERT", "/certs/tls.crt"),
            client_key: vars.string_or("PG_CLIENT_KEY", "/certs/tls.key"),
            root_cert: vars.string_or("PG_SSLROOTCERT", "/certs/ca.crt"),
            max_connections: vars.parsed("PG_MAX_CONNECTIONS")?.unwrap_or(10),
            acquire_timeout: vars.millis("PG_ACQUIRE_TIMEOUT_MS", 3000)?,
            connect_timeout: Duration::from_secs(
                vars.parsed("PG_CONNECT_TIMEOUT_SECS")?.unwrap_or(10),
            ),
        };

        if database.url.is_none() {
            if database.host.is_empty() {
                return Err(ConfigError::Missing("PG_HOST"));
            }
            if database.port == 0 {
                return Err(ConfigError::Invalid("PG_PORT"));
            }
            if database.database.is_empty() {
                return Err(ConfigError::Missing("PG_DB"));
            }
            if database.user.is_empty() {
                return Err(ConfigError::Missing("PG_USER"));
            }
            if !database.local && database.password.is_empty() {
                return Err(ConfigError::Missing("PG_PASSWORD"));
            }
        }
        if database.max_connections == 0 {
            return Err(ConfigError::Invalid("PG_MAX_CONNECTIONS"));
        }

        let max_age: i64 = vars.parsed("CORS_MAX_AGE")?.unwrap_or(300);
        if max_age < 0 {
            return Err(ConfigError::Invalid("CORS_MAX_AGE"));
        }

        let cors = CorsPolicy::new(
            vars.list_or("CORS_ALLOWED_ORIGINS", &["*"]),
            vars.list_or(
                "CORS_ALLOWED_METHODS",
                &["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"],
            ),
            vars.list_or(
                "CORS_ALLOWED_HEADERS",
                &["Accept", "Authorization", "Content-Type", "X-CSRF-Token"],
            ),
            vars.list_or("CORS_EXPOSED_HEADERS", &["Link"]),
            vars.flag("CORS_ALLOW_CREDENTIALS", true)?,
            Duration::from_secs(max_age as u64),
        )
        .map_err(ConfigError::Invalid)?;

        let oidc = OidcConfig {
            enabled: vars.flag("OIDC_ENABLED", false)?,
            issuer: vars.string_or("OIDC_ISSUER", ""),
            audience: vars.string_or("OIDC_AUDIENCE", ""),
            refresh_timeout: vars.millis("JWKS_REFRESH_TIMEOUT_MS", 3000)?,
            cache_ttl: Duration::from_secs(vars.parsed("JWKS_CACHE_TTL_SECS")?.unwrap_or(300)),
            min_refresh_interval: Duration::from_secs(
                vars.parsed("JWKS_MIN_REFRESH_INTERVAL_SECS")?.unwrap_or(10),
            ),
        };

        if oidc.enabled {
            if oidc.issuer.is_empty() {
                return Err(ConfigError::Missing("OIDC_ISSUER"));
            }
            if oidc.audience.is_empty() {
                return Err(ConfigError::Missing("OIDC_AUDIENCE"));
            }
            if oidc.cache_ttl.is_zero() {
                return Err(ConfigError::Invalid("JWKS_CACHE_TTL_SECS"));
            }
        }

        let health_probe_timeout = vars.millis("HEALTH_PROBE_TIMEOUT_MS", 2000)?;

        let request_timeout =
            Duration::from_secs(vars.parsed("REQUEST_TIMEOUT_SECS")?.unwrap_or(30));
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid("REQUEST_TIMEOUT_SECS"));
        }

        let request_body_limit = vars
            .parsed("REQUEST_BODY_LIMIT_BYTES")?
            .unwrap_or(1024 * 1024);

        Ok(Self {
            addr,
            debug_mode,
            database,
            cors,
            oidc,
            health_probe_timeout,
            request_timeout,
            request_body_limit,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, fallback: &str) -> String {
        (self.0)(key).unwrap_or_else(|| fallback.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            Some(v) => v.parse().map(Some).map_err(|_| ConfigError::Invalid(key)),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &'static str, fallback: bool) -> Result<bool, ConfigError> {
        match self.string(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(fallback),
            Some(v) => match v.as_str() {
                "1" | "t" | "true" | "yes" | "on" => Ok(true),
                "0" | "f" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid(key)),
            },
        }
    }

    fn millis(&self, key: &'static str, fallback: u64) -> Result<Duration, ConfigError> {
        let ms = self.parsed::<u64>(key)?.unwrap_or(fallback);
        if ms == 0 {
            return Err(ConfigError::Invalid(key));
        }
        Ok(Duration::from_millis(ms))
    }

    fn list_or(&self, key: &str, fallback: &[&str]) -> Vec<String> {
        let parts = self
            .string(key)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        if parts.is_empty() {
            fallback.iter().map(|s| s.to_string()).collect()
        } else {
            parts
        }
    }
}
