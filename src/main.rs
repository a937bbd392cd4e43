use anyhow::Result;
use tokio::net::TcpListener;

use push_patterns_service::config::Settings;
use push_patterns_service::server::{create_app, AppState};
use push_patterns_service::shutdown::{wait_for_signal, GracefulShutdown, ShutdownConfig};
use push_patterns_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing; the guard flushes exported spans on exit
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        longpoll_timeout_ms = settings.longpoll.timeout_ms,
        tick_interval_ms = settings.sse.tick_interval_ms,
        "Configuration loaded"
    );

    // Create application state
    let state = AppState::new(settings.clone());
    let shutdown = GracefulShutdown::new(
        state.dispatcher.clone(),
        state.shutdown.clone(),
        ShutdownConfig::from(&settings.shutdown),
    );
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = wait_for_signal().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
