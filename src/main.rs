use anyhow::Context;
use std::sync::Arc;

use marquee_api::{
    api::{create_router, AppState},
    storage::{ArtifactStorage, FsArtifactStorage},
    telemetry, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init_logging(&config.log_level, config.log_format)?;

    let engine = config.engine().context("Invalid configuration")?;
    let storage = FsArtifactStorage::new(engine.artifacts_dir().clone());

    match storage.list_versions().await {
        Ok(versions) => tracing::info!(?versions, "Published model versions"),
        Err(e) => tracing::warn!(error = %e, "Could not list model versions"),
    }

    let state = AppState::new(Arc::new(storage), &engine);

    // Load eagerly so the first request does not pay for it. A failure here
    // leaves the service degraded and the next query retries.
    if let Err(e) = state.store.active_or_load().await {
        tracing::warn!(
            version = engine.model_version(),
            error = %e,
            "Default model not loaded at startup"
        );
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
