use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use medchain_infra::{Runtime, Settings, runtime::connect_bus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    medchain_observability::init();
    let log = medchain_observability::component_span("medchain-api");

    let settings = Settings::from_env(&log);
    let bus = connect_bus(&settings, &log).context("failed to connect message bus")?;
    let runtime = Arc::new(Runtime::assemble(bus, &settings, &log));
    runtime.start().context("failed to start consumers")?;

    let app = medchain_api::app::build_app(Arc::clone(&runtime));

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(parent: &log, addr = %listener.local_addr()?, bus = ?settings.bus, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // Worker threads are joined inside the shutdown window.
    tokio::task::spawn_blocking(move || runtime.shutdown())
        .await
        .context("shutdown task panicked")??;
    info!(parent: &log, "stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; shutting down");
    }
}
