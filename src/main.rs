//! # Chat Core
//!
//! Messaging coordination core of a chat platform.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool and migrations
//! - Redis connections
//! - The event synchronizer and maintenance workers
//! - The HTTP server

use anyhow::Result;
use tracing::info;

use chat_core::config::Settings;
use chat_core::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    chat_core::telemetry::init_tracing();

    info!("Starting chat core...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
