//! rule-proxy binary entry point.
//!
//! Usage:
//! ```bash
//! rule-proxy --config rule-proxy.toml
//! rule-proxy --routes "http://hs1:8008,3000;http://hs2:8008,3001" --admin-bind 0.0.0.0:8080
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rule_proxy::config::{parse_routes, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Controllable fault-injection reverse proxy.
#[derive(Parser, Debug)]
#[command(name = "rule-proxy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compact route table, `upstream,port;upstream,port` (overrides the file)
    #[arg(long)]
    routes: Option<String>,

    /// Admin channel bind address (overrides the file)
    #[arg(long)]
    admin_bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(routes) = &cli.routes {
        config.routes = parse_routes(routes).context("parsing --routes")?;
    }
    if let Some(bind) = cli.admin_bind {
        config.admin.bind_address = bind;
    }

    let running = rule_proxy::start(config)
        .await
        .context("starting rule-proxy")?;

    shutdown_signal().await;
    tracing::info!("Shutting down");
    running.shutdown().await;
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM from `docker stop`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
}
