//! Model source cache: URI → immutable bytes, kept for the process lifetime.
//!
//! Only `file://` URIs are served. `file:///abs/path` is absolute; anything
//! else after the scheme is resolved against the configured model root.
//! Percent-escapes in the path are decoded before it touches the filesystem.
//! Keys are the URI string with one trailing `/` stripped; case matters.
//!
//! The cache never touches the filesystem itself; the loader in
//! `services::models` reads bytes outside the session lock and inserts them.

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::info;

const FILE_SCHEME: &str = "file://";

#[derive(Debug, thiserror::Error)]
pub enum ModelSourceError {
    #[error("unsupported model uri: {0}")]
    UnsupportedScheme(String),
    #[error("model uri has no path: {0}")]
    EmptyPath(String),
    #[error("model uri path is not valid utf-8 once decoded: {0}")]
    InvalidEscape(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read-only model bytes shared with every caller that asked for the URI.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelSource {
    uri: String,
    data: Vec<u8>,
}

impl ModelSource {
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug)]
pub struct ModelSourceCache {
    root: PathBuf,
    sources: HashMap<String, Arc<ModelSource>>,
}

impl ModelSourceCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), sources: HashMap::new() }
    }

    /// Cache key for a URI.
    #[must_use]
    pub fn normalize(uri: &str) -> &str {
        uri.strip_suffix('/').unwrap_or(uri)
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<ModelSource>> {
        self.sources.get(Self::normalize(uri)).cloned()
    }

    /// Filesystem path a URI refers to.
    ///
    /// # Errors
    ///
    /// [`ModelSourceError::UnsupportedScheme`] for anything but `file://`;
    /// [`ModelSourceError::EmptyPath`] if nothing follows the scheme;
    /// [`ModelSourceError::InvalidEscape`] if the decoded path is not utf-8.
    pub fn resolve_path(&self, uri: &str) -> Result<PathBuf, ModelSourceError> {
        let Some(rest) = Self::normalize(uri).strip_prefix(FILE_SCHEME) else {
            return Err(ModelSourceError::UnsupportedScheme(uri.to_owned()));
        };
        let rest = percent_decode_str(rest).decode_utf8().map_err(|_| ModelSourceError::InvalidEscape(uri.to_owned()))?;
        if rest.is_empty() || rest == "/" {
            return Err(ModelSourceError::EmptyPath(uri.to_owned()));
        }
        let path = Path::new(&*rest);
        Ok(if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) })
    }

    /// Store bytes read elsewhere. If another caller won the race, their
    /// entry is kept and returned.
    pub fn insert(&mut self, uri: &str, data: Vec<u8>) -> Arc<ModelSource> {
        let key = Self::normalize(uri).to_owned();
        Arc::clone(self.sources.entry(key.clone()).or_insert_with(|| {
            info!(uri = %key, bytes = data.len(), "model source cached");
            Arc::new(ModelSource { uri: key, data })
        }))
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
