// crates/server/src/main.rs
//! Statboard server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use statboard_core::DashboardConfig;
use statboard_server::{create_app, init_metrics, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "statboard", version, about = "Dashboard data-aggregation server")]
struct Cli {
    /// TOML config file (defaults to the platform config dir if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `port` from config and STATBOARD_PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statboard=info,statboard_server=info,statboard_core=info,statboard_db=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = DashboardConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    init_metrics();

    let state = AppState::from_config(&config)
        .await
        .context("opening dashboard cache")?;
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        api_base_url = %config.api_base_url,
        "statboard v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
