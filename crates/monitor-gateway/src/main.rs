use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "monitor_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("MONITOR_CONFIG").ok();
    let config = monitor_core::config::MonitorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        monitor_core::config::MonitorConfig::default()
    });

    let storage = Arc::new(monitor_storage::SqliteStorage::open(&config.database.path)?);
    let router = monitor_ai::build_router(&config.ai);
    let triage = monitor_ai::TriageClient::with_use_case_config(router, &config.ai);
    let processor = Arc::new(monitor_processor::EventProcessor::new(storage.clone(), triage));
    let decryptor = Arc::new(monitor_storage::PlaintextDecryptor);
    let engine = Arc::new(monitor_engine::MonitorEngine::new(
        storage.clone(),
        decryptor,
        processor,
        config.engine.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_handle = tokio::spawn(engine.clone().run(shutdown_rx));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState { config, engine });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("monitor gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = engine_handle.await {
        tracing::warn!(error = %e, "engine task panicked during shutdown drain");
    }

    Ok(())
}
