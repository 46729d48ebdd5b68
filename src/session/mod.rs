//! Session: the live entity graph behind every connection.
//!
//! DESIGN
//! ======
//! One `Session` owns the handle registry, the live-gadget list, the frame
//! listeners, and the model source cache. It is shared behind a single async
//! mutex in `AppState`, so every operation below runs to completion without
//! interleaving; none of them await.
//!
//! ROUTING
//! =======
//! Pushes address mailboxes by global id (`gadget << 32 | local`). A global
//! id whose gadget is gone is dropped with a debug log, never an error: the
//! sender may have raced a disconnect. Mailboxes are created on first push.
//!
//! FRAMES
//! ======
//! Scene and texture updates, new listeners, and gadget teardown set the
//! dirty flag. [`Session::take_frame`] gathers one immutable frame only when
//! dirty, assigns the next frame id, and clears the flag.

pub mod entity;
pub mod mailbox;
pub mod source;

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;
use wire::addr::decompose;
use wire::events::{GrabEvent, GrabberIntersections, PanelMouseEvent, PokerProximity};
use wire::scene::{FrameRoot, GadgetTexture, SceneFrame, SceneNode, TextureInfo, Transform};
use wire::GlobalId;

use crate::envelope::ErrorCode;
use crate::registry::{Handle, Registry, RegistryError};
use crate::services::broadcast::FrameListener;
use entity::{App, Gadget, ModelInstance};
use mailbox::MailboxError;
use source::{ModelSourceCache, ModelSourceError};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error(transparent)]
    Source(#[from] ModelSourceError),
}

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "E_INVALID_PARAMETER",
            Self::Internal(_) => "E_INTERNAL",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::Mailbox(MailboxError::NoEvents) => "E_NO_EVENTS",
            Self::Mailbox(MailboxError::InsufficientBufferSize { .. }) => "E_INSUFFICIENT_BUFFER",
            Self::Source(_) => "E_REQUEST_FAILED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Mailbox(MailboxError::NoEvents))
    }
}

fn not_found(kind: &str, handle: Handle) -> SessionError {
    SessionError::InvalidParameter(format!("no {kind} with handle {handle}"))
}

/// Which side of a grab `last_counterpart` asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counterpart {
    /// Ask a grabber for the grabbable it last touched.
    Grabbable,
    /// Ask a grabbable for the grabber that last touched it.
    Grabber,
}

/// One gathered frame and everyone who should receive it.
pub type FrameBatch = (Arc<SceneFrame>, Vec<Arc<dyn FrameListener>>);

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    registry: Registry,
    /// Live gadgets in creation order; frame roots follow this order.
    gadgets: Vec<Handle>,
    listeners: Vec<(Uuid, Arc<dyn FrameListener>)>,
    sources: ModelSourceCache,
    dirty: bool,
    next_frame_id: u64,
}

impl Session {
    #[must_use]
    pub fn new(model_root: impl Into<PathBuf>) -> Self {
        Self {
            registry: Registry::new(),
            gadgets: Vec::new(),
            listeners: Vec::new(),
            sources: ModelSourceCache::new(model_root),
            dirty: false,
            next_frame_id: 1,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn sources(&self) -> &ModelSourceCache {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut ModelSourceCache {
        &mut self.sources
    }

    fn gadget(&self, handle: Handle) -> Result<&Gadget, SessionError> {
        self.registry.find::<Gadget>(handle).ok_or_else(|| not_found("gadget", handle))
    }

    fn gadget_mut(&mut self, handle: Handle) -> Result<&mut Gadget, SessionError> {
        self.registry.find_mut::<Gadget>(handle).ok_or_else(|| not_found("gadget", handle))
    }

    /// Owning gadget and local id for a pushed global id, if still live.
    fn route(&mut self, global_id: GlobalId, target: &'static str) -> Option<(&mut Gadget, u32)> {
        let (gadget_id, local_id) = decompose(global_id);
        let gadget = self.registry.find_mut::<Gadget>(gadget_id);
        if gadget.is_none() {
            debug!(global_id, gadget_id, target, "session: dropping push for unknown gadget");
        }
        gadget.map(|g| (g, local_id))
    }
}

// =============================================================================
// APPS
// =============================================================================

impl Session {
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `name` is empty.
    pub fn create_app(&mut self, client_id: Uuid, name: &str) -> Result<Handle, SessionError> {
        if name.is_empty() {
            return Err(SessionError::InvalidParameter("app name required".into()));
        }
        let handle = self.registry.create(App::new(name, client_id))?;
        info!(%client_id, handle, name, "session: app created");
        Ok(handle)
    }

    /// Remove the app. Its gadgets stay live and are detached.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not an app.
    pub fn destroy_app(&mut self, handle: Handle) -> Result<(), SessionError> {
        let app = self.registry.take::<App>(handle).ok_or_else(|| not_found("app", handle))?;
        for gadget in &app.gadgets {
            if let Some(gadget) = self.registry.find_mut::<Gadget>(*gadget) {
                gadget.app = None;
            }
        }
        info!(handle, name = %app.name, detached = app.gadgets.len(), "session: app destroyed");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not an app.
    pub fn app_gadgets(&self, handle: Handle) -> Result<&[Handle], SessionError> {
        self.registry.find::<App>(handle).map(|app| app.gadgets.as_slice()).ok_or_else(|| not_found("app", handle))
    }
}

// =============================================================================
// GADGETS
// =============================================================================

impl Session {
    /// Register a gadget. Its handle doubles as the gadget id in global ids.
    /// Creation alone does not dirty the frame.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] for an empty name or unknown app.
    pub fn create_gadget(
        &mut self,
        client_id: Uuid,
        name: &str,
        hook: &str,
        app: Option<Handle>,
    ) -> Result<Handle, SessionError> {
        if name.is_empty() {
            return Err(SessionError::InvalidParameter("gadget name required".into()));
        }
        if let Some(app) = app {
            if self.registry.find::<App>(app).is_none() {
                return Err(not_found("app", app));
            }
        }

        let handle = self.registry.create(Gadget::new(name, client_id, app, hook))?;
        if let Some(app) = app.and_then(|app| self.registry.find_mut::<App>(app)) {
            app.gadgets.push(handle);
        }
        self.gadgets.push(handle);
        info!(%client_id, handle, name, hook, "session: gadget created");
        Ok(handle)
    }

    /// Destroy a gadget with its mailboxes and model instances.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a gadget.
    pub fn destroy_gadget(&mut self, handle: Handle) -> Result<(), SessionError> {
        let gadget = self.registry.take::<Gadget>(handle).ok_or_else(|| not_found("gadget", handle))?;
        for model in &gadget.models {
            self.registry.destroy(*model);
        }
        if let Some(app) = gadget.app.and_then(|app| self.registry.find_mut::<App>(app)) {
            app.gadgets.retain(|g| *g != handle);
        }
        self.gadgets.retain(|g| *g != handle);
        self.dirty = true;
        info!(handle, name = %gadget.name, models = gadget.models.len(), "session: gadget destroyed");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a gadget.
    pub fn gadget_name(&self, handle: Handle) -> Result<&str, SessionError> {
        self.gadget(handle).map(|g| g.name.as_str())
    }

    /// Replace the gadget's scene graph wholesale.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a gadget.
    pub fn update_scene(&mut self, handle: Handle, nodes: Vec<SceneNode>) -> Result<(), SessionError> {
        let gadget = self.gadget_mut(handle)?;
        debug!(handle, nodes = nodes.len(), "session: scene updated");
        gadget.nodes = nodes;
        self.dirty = true;
        Ok(())
    }

    /// Set the shared texture for each listed gadget. Unknown handles are
    /// skipped. Returns how many gadgets were updated.
    pub fn update_texture(&mut self, gadgets: &[Handle], texture: &TextureInfo) -> usize {
        let mut updated = 0;
        for handle in gadgets {
            match self.registry.find_mut::<Gadget>(*handle) {
                Some(gadget) => {
                    gadget.texture = Some(texture.clone());
                    updated += 1;
                }
                None => debug!(handle, "session: texture update for unknown gadget"),
            }
        }
        self.dirty = true;
        updated
    }
}

// =============================================================================
// MODELS
// =============================================================================

impl Session {
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] for an empty URI or unknown gadget.
    pub fn create_model_instance(&mut self, gadget: Handle, uri: &str) -> Result<Handle, SessionError> {
        if uri.is_empty() {
            return Err(SessionError::InvalidParameter("model uri required".into()));
        }
        self.gadget(gadget)?;
        let handle = self.registry.create(ModelInstance::new(uri, gadget))?;
        self.gadget_mut(gadget)?.models.push(handle);
        debug!(gadget, handle, uri, "session: model instance created");
        Ok(handle)
    }

    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a model instance.
    pub fn set_model_transform(&mut self, handle: Handle, transform: Transform, parent: &str) -> Result<(), SessionError> {
        let model = self.registry.find_mut::<ModelInstance>(handle).ok_or_else(|| not_found("model", handle))?;
        model.transform = transform;
        parent.clone_into(&mut model.parent);
        Ok(())
    }

    /// The transform and parent path last set on the instance.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a model instance.
    pub fn model_transform(&self, handle: Handle) -> Result<(Transform, &str), SessionError> {
        self.registry
            .find::<ModelInstance>(handle)
            .map(|m| (m.transform, m.parent.as_str()))
            .ok_or_else(|| not_found("model", handle))
    }

    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] if `handle` is not a model instance.
    pub fn destroy_model_instance(&mut self, handle: Handle) -> Result<(), SessionError> {
        let model = self.registry.take::<ModelInstance>(handle).ok_or_else(|| not_found("model", handle))?;
        if let Some(gadget) = self.registry.find_mut::<Gadget>(model.gadget) {
            gadget.models.retain(|m| *m != handle);
        }
        debug!(handle, uri = %model.uri, "session: model instance destroyed");
        Ok(())
    }
}

// =============================================================================
// PUSHES
// =============================================================================

impl Session {
    pub fn push_poker_proximity(&mut self, poker_id: GlobalId, proximity: Vec<PokerProximity>) {
        if let Some((gadget, local)) = self.route(poker_id, "poker") {
            gadget.pokers.entry(local).or_default().push_proximity(proximity);
        }
    }

    pub fn push_grab_intersections(&mut self, intersections: GrabberIntersections) {
        if let Some((gadget, local)) = self.route(intersections.grabber_id, "grabber") {
            gadget.grabbers.entry(local).or_default().push_intersections(intersections);
        }
    }

    pub fn push_panel_event(&mut self, panel_id: GlobalId, event: PanelMouseEvent) {
        if let Some((gadget, local)) = self.route(panel_id, "panel") {
            gadget.panels.entry(local).or_default().push(event);
        }
    }

    pub fn push_grabber_event(&mut self, grabber_id: GlobalId, event: GrabEvent) {
        if let Some((gadget, local)) = self.route(grabber_id, "grabber") {
            gadget.grabbers.entry(local).or_default().push_event(event);
        }
    }

    pub fn push_grabbable_event(&mut self, grabbable_id: GlobalId, event: GrabEvent) {
        if let Some((gadget, local)) = self.route(grabbable_id, "grabbable") {
            gadget.grabbables.entry(local).or_default().push_event(event);
        }
    }
}

// =============================================================================
// PULLS
// =============================================================================

impl Session {
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] for an unknown gadget, otherwise
    /// the mailbox's [`MailboxError`].
    pub fn pull_poker(&self, gadget: Handle, local: u32, capacity: Option<usize>) -> Result<Vec<PokerProximity>, SessionError> {
        let mailbox = self.gadget(gadget)?.pokers.get(&local).ok_or(MailboxError::NoEvents)?;
        Ok(mailbox.pull(capacity)?)
    }

    /// # Errors
    ///
    /// As [`Session::pull_poker`].
    pub fn pull_panel(&mut self, gadget: Handle, local: u32) -> Result<PanelMouseEvent, SessionError> {
        let mailbox = self.gadget_mut(gadget)?.panels.get_mut(&local).ok_or(MailboxError::NoEvents)?;
        Ok(mailbox.pull()?)
    }

    /// # Errors
    ///
    /// As [`Session::pull_poker`].
    pub fn pull_grabber_intersections(
        &self,
        gadget: Handle,
        local: u32,
        capacity: Option<usize>,
    ) -> Result<GrabberIntersections, SessionError> {
        let mailbox = self.gadget(gadget)?.grabbers.get(&local).ok_or(MailboxError::NoEvents)?;
        Ok(mailbox.pull_intersections(capacity)?)
    }

    /// # Errors
    ///
    /// As [`Session::pull_poker`].
    pub fn pull_grabber_event(&mut self, gadget: Handle, local: u32) -> Result<GrabEvent, SessionError> {
        let mailbox = self.gadget_mut(gadget)?.grabbers.get_mut(&local).ok_or(MailboxError::NoEvents)?;
        Ok(mailbox.pull_event()?)
    }

    /// # Errors
    ///
    /// As [`Session::pull_poker`].
    pub fn pull_grabbable_event(&mut self, gadget: Handle, local: u32) -> Result<GrabEvent, SessionError> {
        let mailbox = self.gadget_mut(gadget)?.grabbables.get_mut(&local).ok_or(MailboxError::NoEvents)?;
        Ok(mailbox.pull_event()?)
    }

    /// Most recent grab counterpart seen by a grabber or grabbable mailbox.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidParameter`] for an unknown gadget.
    pub fn last_counterpart(&self, gadget: Handle, local: u32, kind: Counterpart) -> Result<Option<GlobalId>, SessionError> {
        let gadget = self.gadget(gadget)?;
        Ok(match kind {
            Counterpart::Grabbable => gadget.grabbers.get(&local).and_then(|m| m.last_grabbable()),
            Counterpart::Grabber => gadget.grabbables.get(&local).and_then(|m| m.last_grabber()),
        })
    }
}

// =============================================================================
// LISTENERS & FRAMES
// =============================================================================

impl Session {
    /// Register the client's frame listener, replacing any earlier one.
    pub fn listen_for_frames(&mut self, client_id: Uuid, listener: Arc<dyn FrameListener>) {
        self.listeners.retain(|(owner, _)| *owner != client_id);
        self.listeners.push((client_id, listener));
        self.dirty = true;
        debug!(%client_id, listeners = self.listener_count(), "session: frame listener registered");
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drop every gadget and listener the connection owns. Apps survive.
    pub fn client_disconnected(&mut self, client_id: Uuid) {
        let owned: Vec<Handle> = self
            .gadgets
            .iter()
            .copied()
            .filter(|h| self.registry.find::<Gadget>(*h).is_some_and(|g| g.client_id == client_id))
            .collect();
        for handle in &owned {
            if let Err(e) = self.destroy_gadget(*handle) {
                debug!(%client_id, handle, error = %e, "session: gadget vanished during disconnect");
            }
        }
        self.listeners.retain(|(owner, _)| *owner != client_id);
        self.dirty = true;
        info!(%client_id, gadgets = owned.len(), "session: client cleaned up");
    }

    /// Gather the next frame if anything changed since the last one.
    pub fn take_frame(&mut self) -> Option<FrameBatch> {
        if !self.is_dirty() {
            return None;
        }

        let mut roots = Vec::with_capacity(self.gadgets.len());
        let mut gadget_textures = Vec::new();
        for handle in &self.gadgets {
            let Some(gadget) = self.registry.find::<Gadget>(*handle) else {
                continue;
            };
            roots.push(FrameRoot { nodes: gadget.nodes.clone(), hook: gadget.hook.clone(), source_id: *handle });
            if let Some(texture) = &gadget.texture {
                gadget_textures.push(GadgetTexture {
                    gadget_name: gadget.name.clone(),
                    gadget_id: *handle,
                    texture_info: texture.clone(),
                });
            }
        }

        let frame = SceneFrame { id: self.next_frame_id, roots, gadget_textures };
        self.next_frame_id += 1;
        self.dirty = false;
        let listeners = self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        Some((Arc::new(frame), listeners))
    }
}
