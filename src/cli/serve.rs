//! Serve command implementation

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use shikigami::config::Config;
use shikigami::orchestrator::Orchestrator;
use shikigami::server::start_http_server;

/// Run the runner until Ctrl-C
pub async fn serve_command(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let orchestrator = Arc::new(Orchestrator::from_config(&config));
    let health = orchestrator.health();
    if health.agent_available {
        info!("[shikigami:agent] Using {}", health.agent_command);
    } else {
        warn!(
            "[shikigami:agent] Agent CLI unavailable ({}); invocations will fail until it is installed",
            health.agent_command
        );
    }
    match config.artifacts_dir() {
        Some(dir) => info!("[shikigami:jobs] Artifacts under {}", dir.display()),
        None => info!("[shikigami:jobs] Artifacts disabled"),
    }

    if let Some(interval) = config.jobs.sweep_interval() {
        orchestrator.start_sweeper(interval);
    }

    let server = start_http_server(
        &config.server.bind_addr(),
        orchestrator.clone(),
        tokio::runtime::Handle::current(),
    )?;
    println!("shikigami listening on http://{}", server.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("[shikigami:http] Shutting down");

    tokio::task::spawn_blocking(move || server.shutdown())
        .await
        .context("HTTP server shutdown failed")?;
    orchestrator.shutdown().await;
    Ok(())
}
