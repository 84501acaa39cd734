/*
 * Responsibility
 * - Config -> tracing -> contract -> storage pool -> (optional) OIDC verifier
 * - Compose the pipeline and serve with graceful shutdown
 * - Any failure here is a startup failure (non-zero exit from main)
 */
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::api::{Binding, dispatch_table};
use crate::config::{Config, DatabaseConfig, OidcConfig};
use crate::middleware::access_log::AccessLogger;
use crate::middleware::http::HttpLimits;
use crate::pipeline::{self, PipelineSettings};
use crate::repos::PgUserStore;
use crate::services::auth::{
    HttpKeySource, KeySetCache, KeySetPolicy, TokenVerifier, discover_jwks_uri,
};
use crate::services::contract::{API_CONTRACT, RouteContract};
use crate::services::health::{DatabaseCheck, DependencyCheck, HealthProbe};
use crate::state::AppState;
use crate::telemetry;

pub async fn run() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    telemetry::init_tracing(config.debug_mode);

    let contract =
        Arc::new(RouteContract::from_yaml(API_CONTRACT).context("failed to load API contract")?);
    tracing::info!(operations = contract.operations().len(), "API contract loaded");

    let db = connect_database(&config.database).await?;

    let verifier = if config.oidc.enabled {
        Some(build_verifier(&config.oidc).await?)
    } else {
        tracing::warn!("OIDC disabled: secured operations are served without authentication");
        None
    };

    let checks: Vec<Arc<dyn DependencyCheck>> = vec![Arc::new(DatabaseCheck::new(db.clone()))];
    let probe = HealthProbe::new(checks, config.health_probe_timeout);
    let state = AppState::new(Arc::new(PgUserStore::new(db)), Arc::new(probe));

    let table = dispatch_table();
    if config.debug_mode {
        log_routes(&table);
    }

    let app = pipeline::compose(
        state,
        contract,
        table,
        PipelineSettings {
            cors: config.cors,
            limits: HttpLimits {
                body_limit: config.request_body_limit,
                timeout: config.request_timeout,
            },
            verifier,
            access_logger: AccessLogger::tracing(config.debug_mode),
        },
    )
    .context("dispatch table does not match the API contract")?;

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, debug = config.debug_mode, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn connect_database(config: &DatabaseConfig) -> Result<PgPool> {
    let options = config.connect_options()?;

    let pool = tokio::time::timeout(
        config.connect_timeout,
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options),
    )
    .await
    .context("timed out connecting to PostgreSQL")?
    .context("failed to connect to PostgreSQL")?;

    tracing::info!(max_connections = config.max_connections, "connected to PostgreSQL");
    Ok(pool)
}

async fn build_verifier(config: &OidcConfig) -> Result<Arc<TokenVerifier>> {
    let client = reqwest::Client::builder()
        .timeout(config.refresh_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let jwks_uri = discover_jwks_uri(&client, &config.issuer, config.refresh_timeout)
        .await
        .context("OIDC discovery failed")?;
    tracing::info!(issuer = %config.issuer, jwks_uri = %jwks_uri, "OIDC provider discovered");

    let keys = KeySetCache::connect(
        Arc::new(HttpKeySource::new(client, jwks_uri)),
        KeySetPolicy {
            ttl: config.cache_ttl,
            refresh_timeout: config.refresh_timeout,
            min_refresh_interval: config.min_refresh_interval,
        },
    )
    .await
    .context("failed to load signing keys")?;
    keys.spawn_refresh_task();

    Ok(Arc::new(TokenVerifier::new(
        keys,
        config.issuer.clone(),
        config.audience.clone(),
    )))
}

fn log_routes(table: &[Binding]) {
    for binding in table {
        tracing::info!(
            method = %binding.method,
            path = binding.path,
            operation_id = binding.operation_id,
            "route"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
