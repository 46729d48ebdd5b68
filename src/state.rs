//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. The
//! whole session sits behind one async mutex: every request handler and the
//! frame loop take it briefly and never await while holding it, which keeps
//! entity mutation strictly one-at-a-time.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::session::Session;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let session = Session::new(config.model_root.clone());
        Self { session: Arc::new(Mutex::new(session)), config: Arc::new(config) }
    }
}
