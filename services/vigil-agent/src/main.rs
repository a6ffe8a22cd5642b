use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_agent::{AgentConfig, HttpCoordinator, ScheduleRunner, SchemeProbe};
use vigil_core::BUILD_INFO;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::parse();
    let agent_id = config.agent_id();
    info!("Starting Vigil Agent {} as {}", BUILD_INFO, agent_id);

    let coordinator = Arc::new(HttpCoordinator::new(config.coordinator.clone())?);
    let probe = Arc::new(SchemeProbe::new(config.probe_timeout())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut runners = Vec::with_capacity(config.schedules.len());
    for target in &config.schedules {
        info!(
            schedule_id = target.schedule_id,
            node = %target.node,
            url = %target.url,
            "Starting schedule runner"
        );
        let runner = ScheduleRunner::new(
            coordinator.clone(),
            probe.clone(),
            agent_id,
            target.clone(),
            config.runner_config(),
        );
        let shutdown = shutdown_rx.clone();
        runners.push(tokio::spawn(async move { runner.run(shutdown).await }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, releasing leases");
    shutdown_tx.send(true)?;

    for runner in runners {
        runner.await?;
    }
    info!("Vigil Agent stopped");
    Ok(())
}
