//! DCO Console: dynamic creative decisioning service.
//!
//! Main entry point that loads configuration, wires the campaign store and
//! analytics sink, and starts the server.

use anyhow::Context;
use clap::Parser;
use dco_analytics::AnalyticsLogger;
use dco_api::ApiServer;
use dco_core::config::AppConfig;
use dco_management::ManagementStore;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dco-console")]
#[command(about = "Dynamic creative optimization: ad decisioning and campaign editor API")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still apply on top)
    #[arg(long, short, env = "DCO_CONSOLE_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "DCO_CONSOLE__NODE_ID")]
    node_id: Option<String>,

    /// Bind address (overrides config)
    #[arg(long, env = "DCO_CONSOLE__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DCO_CONSOLE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "DCO_CONSOLE__METRICS__PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dco_console=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("DCO Console starting up");

    // Load configuration; an explicit file must load, env-only falls back
    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("failed to load config file {path}"))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        generation_cap = config.dco.generation_cap,
        "Configuration loaded"
    );

    let store = Arc::new(ManagementStore::from_config(&config.dco));

    // Initialize analytics logger
    let analytics = Arc::new(
        AnalyticsLogger::new(&config.analytics, config.node_id.clone())
            .await
            .context("failed to initialize analytics logger")?,
    );

    let api_server = ApiServer::new(config.clone(), store, analytics.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("DCO Console is ready to serve traffic");

    // Serve until the listener fails or the process is interrupted
    let result = tokio::select! {
        result = api_server.start_http() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    analytics.shutdown().await;
    info!("DCO Console stopped");
    result
}
