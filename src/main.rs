mod config;
mod envelope;
mod registry;
mod routes;
mod services;
mod session;
mod state;

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() {
    // A missing .env is normal outside development.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let port = config.port;
    tracing::info!(
        port,
        frame_tick_ms = config.frame_tick_ms,
        listener_queue_capacity = config.listener_queue_capacity,
        model_root = %config.model_root.display(),
        "config loaded"
    );

    let state = state::AppState::new(config);

    // Spawn the frame broadcast loop.
    let _frames = services::broadcast::spawn_frame_loop(state.clone());

    let app = routes::app(state);
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%port, "gadgethub listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
