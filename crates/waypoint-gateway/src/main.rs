//! # waypoint-gateway
//!
//! Waypoint reverse proxy binary — loads settings, connects the database and
//! Redis, and starts the HTTP server.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use waypoint_server::server::WaypointServer;

/// Waypoint reverse proxy server.
#[derive(Parser, Debug)]
#[command(name = "waypoint-gateway", about = "Waypoint reverse proxy server")]
struct Cli {
    /// Path to a JSON settings file (overrides the built-in defaults).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind, overriding the loaded settings.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the loaded settings.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = waypoint_settings::load_settings(args.settings.as_deref())
        .context("failed to load settings")?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    waypoint_logging::init_subscriber(
        waypoint_server::server::log_format(&settings),
        &settings.server.log_level,
    )
    .context("failed to initialize logging")?;

    let dsn = waypoint_settings::require_dsn(&settings)
        .context("database DSN not configured")?
        .to_string();
    let db_pool = waypoint_storage::build_pool(&dsn).context("failed to open database")?;
    let redis = waypoint_redis::RedisClient::connect(&settings.redis.url)
        .context("failed to connect to redis")?;

    let server = WaypointServer::new(settings, db_pool, redis);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;

    tracing::info!(%addr, "waypoint gateway listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server.shutdown().shutdown();
    let _ = handle.await;

    tracing::info!("shutdown complete");
    Ok(())
}
