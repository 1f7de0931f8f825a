//! Binary entrypoint: initializes tracing, loads config, constructs the
//! orchestrator, and runs the control loop alongside the HTTP server.

use std::env;

use miner_orchestrator::config::make_config_loader;
use miner_orchestrator::config::SafeDisplay;
use miner_orchestrator::orchestrator::Orchestrator;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter = env::var("MINER_ORCH_LOG")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = make_config_loader();
    let config = loader.load().unwrap_or_default();
    init_tracing(&config.logging.level);

    tracing::info!("loaded configuration:\n{}", config.to_safe_string());

    let orchestrator = Orchestrator::bootstrap(make_config_loader()).await?;

    let control_loop = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_control_loop().await })
    };

    tokio::select! {
        result = miner_orchestrator::serve(orchestrator) => {
            result?;
        }
        _ = control_loop => {
            tracing::error!("control loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
