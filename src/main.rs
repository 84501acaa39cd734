/*
 * Responsibility
 * - tokio runtime entry point
 * - delegate to app::run() (no logic here); any startup error exits non-zero
 */
use anyhow::Result;

mod api;
mod app;
mod config;
mod error;
mod middleware;
mod pipeline;
mod repos;
mod services;
mod state;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
