//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The server exposes one websocket endpoint for gadgets and renderers plus a
//! liveness probe. Every HTTP request passes through a `TraceLayer`.

pub mod ws;


use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
