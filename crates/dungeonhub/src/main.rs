//! DungeonHub server entry point.
//!
//! Loads configuration, initializes logging, binds the TCP listener, and
//! runs the server core behind it until a shutdown signal arrives.

mod cli;
mod config;
mod net;
mod signals;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dungeonhub_server::Server;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::CliArgs;
use crate::config::{AppConfig, LoggingSettings};

fn setup_logging(settings: &LoggingSettings, force_json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    if force_json || settings.json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    if let Some(bind_address) = args.bind_address {
        config.server.bind_address = bind_address;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    setup_logging(&config.logging, args.json_logs)?;

    let server_config = config.to_server_config()?;
    let session_config = config.to_session_config()?;
    let server = Arc::new(Mutex::new(Server::new(server_config)));

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    info!(bind_address = %config.server.bind_address, "listening");

    // Periodic tick drives session timeouts and invite expiry.
    let tick_interval = Duration::from_millis(config.server.tick_interval_ms.max(1));
    let tick_server = server.clone();
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            tick_server.lock().tick(Instant::now());
        }
    });

    let listener_task = tokio::spawn(net::run_listener(listener, server, session_config));

    signals::wait_for_shutdown().await?;
    info!("shutting down");
    listener_task.abort();
    tick_task.abort();
    Ok(())
}
