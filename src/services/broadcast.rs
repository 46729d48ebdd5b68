//! Frame broadcast: dirty-checked publisher and listener fan-out.
//!
//! DESIGN
//! ======
//! A background task ticks every `FRAME_TICK_MS`. Each tick takes the session
//! lock just long enough to gather a frame (only when dirty), then releases
//! it and fans the frame out. Every listener call runs as its own task in a
//! `JoinSet`; a supervisor task drains the set and logs failures at debug.
//! Nothing is retried and no listener can hold up another.
//!
//! Websocket connections listen through [`ChannelListener`], which turns a
//! frame into a `frame:new` request envelope on the connection's bounded
//! outbound queue. A full queue drops that frame for that client only.

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod broadcast_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;
use wire::SceneFrame;

use crate::envelope::{Data, Envelope};
use crate::state::AppState;

/// Syscall of the request envelope that carries a frame to a listener.
pub const FRAME_SYSCALL: &str = "frame:new";

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener queue full")]
    QueueFull,
    #[error("listener closed")]
    Closed,
    #[error("frame encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives every published frame.
#[async_trait]
pub trait FrameListener: Send + Sync {
    async fn new_frame(&self, frame: Arc<SceneFrame>) -> Result<(), ListenerError>;
}

// =============================================================================
// CHANNEL LISTENER
// =============================================================================

/// Forwards frames onto a websocket connection's outbound queue.
pub struct ChannelListener {
    client_id: Uuid,
    tx: mpsc::Sender<Envelope>,
}

impl ChannelListener {
    #[must_use]
    pub fn new(client_id: Uuid, tx: mpsc::Sender<Envelope>) -> Self {
        Self { client_id, tx }
    }
}

#[async_trait]
impl FrameListener for ChannelListener {
    async fn new_frame(&self, frame: Arc<SceneFrame>) -> Result<(), ListenerError> {
        let mut data = Data::new();
        data.insert("frame".into(), serde_json::to_value(frame.as_ref())?);
        let envelope = Envelope::request(FRAME_SYSCALL, data).with_from(self.client_id.to_string());
        self.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => ListenerError::QueueFull,
            TrySendError::Closed(_) => ListenerError::Closed,
        })
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Deliver `frame` to every listener concurrently. The returned handle
/// resolves once all deliveries have finished; callers may ignore it.
pub fn fan_out(frame: Arc<SceneFrame>, listeners: Vec<Arc<dyn FrameListener>>) -> JoinHandle<()> {
    let frame_id = frame.id;
    let mut deliveries = JoinSet::new();
    for listener in listeners {
        let frame = Arc::clone(&frame);
        deliveries.spawn(async move { listener.new_frame(frame).await });
    }

    tokio::spawn(async move {
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(frame_id, error = %e, "broadcast: listener rejected frame"),
                Err(e) => debug!(frame_id, error = %e, "broadcast: listener task failed"),
            }
        }
    })
}

/// Gather and fan out one frame if the session is dirty. Returns the frame
/// id that went out.
pub async fn publish_if_dirty(state: &AppState) -> Option<u64> {
    let (frame, listeners) = state.session.lock().await.take_frame()?;
    let frame_id = frame.id;
    debug!(frame_id, roots = frame.roots.len(), listeners = listeners.len(), "broadcast: frame published");
    drop(fan_out(frame, listeners));
    Some(frame_id)
}

#[must_use]
pub fn spawn_frame_loop(state: AppState) -> JoinHandle<()> {
    let tick_ms = state.config.frame_tick_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms, "broadcast: frame loop started");
        loop {
            interval.tick().await;
            publish_if_dirty(&state).await;
        }
    })
}
