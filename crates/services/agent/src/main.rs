//! Rodent agent binary
//!
//! Entry point: tracing, configuration, the single-instance lock, the
//! signal listener, and the agent run loop.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rodent_core::{AgentConfig, Lifecycle, PidFile};

mod agent;
mod handlers;

use agent::{startup_error_message, Agent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting rodent agent");

    let config_path = std::env::var("RODENT_CONFIG")
        .unwrap_or_else(|_| "/etc/rodent/config.toml".to_string());
    let config = AgentConfig::load(Some(&config_path))
        .with_context(|| format!("loading configuration from {}", config_path))?;

    // Single-instance enforcement; a live holder aborts startup
    let pid_file = PidFile::acquire(&config.paths.pid_file).map_err(|e| {
        anyhow::anyhow!("{}", startup_error_message(&e))
    })?;

    let lifecycle = Arc::new(Lifecycle::new());
    let signal_task = lifecycle
        .spawn_signal_listener()
        .context("installing signal handlers")?;

    let agent = Agent::bootstrap(config, lifecycle.clone())
        .map_err(|e| anyhow::anyhow!("{}", startup_error_message(&e)))?;

    agent.run().await.map_err(|e| anyhow::anyhow!("{}", e))?;

    signal_task.abort();
    drop(pid_file);
    tracing::info!("rodent agent shutdown complete");
    Ok(())
}
