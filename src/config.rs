//! Server configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5858;
pub const DEFAULT_FRAME_TICK_MS: u64 = 11;
pub const DEFAULT_LISTENER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Interval between dirty checks of the frame broadcast loop.
    pub frame_tick_ms: u64,
    /// Bounded outbound queue per websocket connection.
    pub listener_queue_capacity: usize,
    /// Base directory for relative `file://` model URIs.
    pub model_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frame_tick_ms: DEFAULT_FRAME_TICK_MS,
            listener_queue_capacity: DEFAULT_LISTENER_QUEUE_CAPACITY,
            model_root: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// - `PORT`: default 5858
    /// - `FRAME_TICK_MS`: default 11
    /// - `LISTENER_QUEUE_CAPACITY`: default 256 (minimum 1)
    /// - `MODEL_ROOT`: default current directory
    #[must_use]
    pub fn from_env() -> Self {
        let model_root = std::env::var("MODEL_ROOT")
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            frame_tick_ms: env_parse("FRAME_TICK_MS", DEFAULT_FRAME_TICK_MS).max(1),
            listener_queue_capacity: env_parse("LISTENER_QUEUE_CAPACITY", DEFAULT_LISTENER_QUEUE_CAPACITY).max(1),
            model_root,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
