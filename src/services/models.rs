//! Model source loading.
//!
//! The session cache answers repeat lookups under the lock. A first lookup
//! resolves the path under the lock, reads the file with `tokio::fs` after
//! releasing it, and inserts the bytes on return. Two concurrent first loads
//! of one URI both read; the first insert wins and both get that entry.

#[cfg(test)]
#[path = "models_test.rs"]
mod models_test;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::session::source::{ModelSource, ModelSourceError};
use crate::session::{Session, SessionError};

/// Cached source for `uri`, reading the file on first use.
///
/// # Errors
///
/// [`SessionError::Source`] for a non-file URI or an unreadable file.
pub async fn find_or_create_source(session: &Mutex<Session>, uri: &str) -> Result<Arc<ModelSource>, SessionError> {
    let path = {
        let session = session.lock().await;
        if let Some(source) = session.sources().get(uri) {
            return Ok(source);
        }
        session.sources().resolve_path(uri)?
    };

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(source) => {
            warn!(uri, path = %path.display(), error = %source, "models: source read failed");
            return Err(ModelSourceError::Io { path, source }.into());
        }
    };

    Ok(session.lock().await.sources_mut().insert(uri, data))
}
