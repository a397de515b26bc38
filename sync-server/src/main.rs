//! sync-server binary

use sync_server::utils::logger;
use sync_server::{AppState, Config, create_router};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    logger::init_logger_with_file(&config.log_level, config.log_dir.as_deref());

    tracing::info!("Starting sync-server (env: {})", config.environment);

    let state = AppState::new(&config)?;
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("sync-server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("sync-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
