use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_coordinator::{router, AppState, BackgroundTasks, CoordinatorConfig};
use vigil_core::{SystemClock, BUILD_INFO};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CoordinatorConfig::parse();
    info!("Starting Vigil Coordinator {}", BUILD_INFO);

    let state = AppState::new(&config, Arc::new(SystemClock));
    let tasks = BackgroundTasks::spawn(&state, &config);
    let app = router(state);

    let listener = TcpListener::bind(config.listen).await?;
    info!("Vigil Coordinator listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown();
    info!("Vigil Coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await
        }
    }
}
