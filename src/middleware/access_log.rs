//! Access logging: one entry per request, whatever happens downstream.
//!
//! - `ResponseRecorder` captures the first status it is given and emits on drop,
//!   so a cancelled request (client gone, future dropped) still logs, as 499.
//! - The logger is an explicit value handed to the pipeline, writing through an
//!   `AccessLogSink` (tracing in production, memory in tests).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
};
use tracing::{Instrument, Level};

use crate::middleware::request_id::CorrelationId;

/// Nginx's "client closed request".
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
    pub client_addr: Option<String>,
}

impl AccessLogEntry {
    pub fn level(&self) -> Level {
        match self.status {
            500.. => Level::ERROR,
            400..=499 => Level::WARN,
            _ => Level::INFO,
        }
    }
}

pub trait AccessLogSink: Send + Sync + 'static {
    fn record(&self, entry: &AccessLogEntry);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured fields, rendered as JSON by the subscriber.
    Json,
    /// Colourised single line for local development.
    Pretty,
}

/// Writes entries as `tracing` events under the `access_log` target.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    format: LogFormat,
}

impl TracingSink {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }
}

macro_rules! emit_at {
    ($level:expr, $($rest:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!(target: "access_log", $($rest)*),
            Level::WARN => tracing::warn!(target: "access_log", $($rest)*),
            _ => tracing::info!(target: "access_log", $($rest)*),
        }
    };
}

impl AccessLogSink for TracingSink {
    fn record(&self, entry: &AccessLogEntry) {
        let level = entry.level();
        match self.format {
            LogFormat::Pretty => {
                let line = pretty_line(entry);
                emit_at!(level, "{}", line);
            }
            LogFormat::Json => {
                emit_at!(
                    level,
                    request_id = %entry.request_id,
                    method = %entry.method,
                    path = %entry.path,
                    status = entry.status,
                    duration_ms = entry.duration.as_secs_f64() * 1000.0,
                    client_addr = entry.client_addr.as_deref().unwrap_or("-"),
                    "HTTP request"
                );
            }
        }
    }
}

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";

fn status_colour(status: u16) -> &'static str {
    match status {
        500.. => RED,
        400..=499 => YELLOW,
        300..=399 => CYAN,
        200..=299 => GREEN,
        _ => RESET,
    }
}

fn method_colour(method: &str) -> &'static str {
    match method {
        "GET" => BLUE,
        "POST" => GREEN,
        "PUT" => YELLOW,
        "DELETE" => RED,
        "PATCH" => CYAN,
        _ => RESET,
    }
}

fn pretty_line(entry: &AccessLogEntry) -> String {
    format!(
        "{GRAY}{time}{RESET} {sc}{status:3}{RESET} {mc}{method:<7}{RESET} {path} {GRAY}{duration:?}{RESET} {GRAY}[{id}]{RESET}",
        time = chrono::Local::now().format("%H:%M:%S"),
        sc = status_colour(entry.status),
        status = entry.status,
        mc = method_colour(&entry.method),
        method = entry.method,
        path = entry.path,
        duration = entry.duration,
        id = entry.request_id,
    )
}

/// Captures entries for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: std::sync::Mutex<Vec<AccessLogEntry>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
impl AccessLogSink for MemorySink {
    fn record(&self, entry: &AccessLogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry.clone());
    }
}

#[derive(Clone)]
pub struct AccessLogger {
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLogger {
    pub fn new(sink: Arc<dyn AccessLogSink>) -> Self {
        Self { sink }
    }

    /// Production logger: pretty lines in debug mode, structured fields otherwise.
    pub fn tracing(debug_mode: bool) -> Self {
        let format = if debug_mode {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        };
        Self::new(Arc::new(TracingSink::new(format)))
    }

    fn record(&self, entry: &AccessLogEntry) {
        self.sink.record(entry);
    }
}

/// Records the outcome of one request and emits exactly one entry when dropped.
pub struct ResponseRecorder {
    logger: AccessLogger,
    pending: Option<AccessLogEntry>,
    started: Instant,
    status: Option<StatusCode>,
}

impl ResponseRecorder {
    pub fn start(
        logger: AccessLogger,
        request_id: &CorrelationId,
        method: &str,
        path: &str,
        client_addr: Option<String>,
    ) -> Self {
        Self {
            logger,
            pending: Some(AccessLogEntry {
                request_id: request_id.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                status: CLIENT_CLOSED_REQUEST,
                duration: Duration::ZERO,
                client_addr,
            }),
            started: Instant::now(),
            status: None,
        }
    }

    /// First write wins; later calls are ignored.
    pub fn record_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }
}

impl Drop for ResponseRecorder {
    fn drop(&mut self) {
        let Some(mut entry) = self.pending.take() else {
            return;
        };
        if let Some(status) = self.status {
            entry.status = status.as_u16();
        }
        entry.duration = self.started.elapsed();
        self.logger.record(&entry);
    }
}

/// Client address: `X-Real-IP`, then the first `X-Forwarded-For` hop, then the peer.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header("x-real-ip") {
        return Some(ip.to_string());
    }
    if let Some(first) = header("x-forwarded-for").and_then(|v| v.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}

pub fn apply(router: Router, logger: AccessLogger) -> Router {
    router.layer(middleware::from_fn_with_state(logger, access_log_middleware))
}

async fn access_log_middleware(
    State(logger): State<AccessLogger>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let correlation_id = CorrelationId::from_request(&req);
    req.extensions_mut().insert(correlation_id.clone());

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let mut recorder = ResponseRecorder::start(
        logger,
        &correlation_id,
        &method,
        &path,
        client_addr(req.headers(), peer),
    );

    let span = tracing::info_span!(
        "request",
        request_id = %correlation_id,
        method = %method,
        path = %path,
        operation_id = tracing::field::Empty,
    );
    let response = next.run(req).instrument(span).await;

    recorder.record_status(response.status());
    response
}
