/*
 * Responsibility
 * - Install the global tracing subscriber once at startup
 * - RUST_LOG wins; otherwise `info`
 * - Debug mode: human-readable ANSI lines. Otherwise: one JSON object per event
 */
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(debug_mode: bool) {
    // Ex: RUST_LOG=info,users_api=debug,access_log=info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if debug_mode {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init();
    }
}
