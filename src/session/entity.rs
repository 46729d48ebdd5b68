//! Live session entities. All cross-references are registry handles, never
//! pointers; a stale handle simply fails to resolve.

use std::collections::HashMap;

use uuid::Uuid;
use wire::scene::{SceneNode, TextureInfo, Transform};

use super::mailbox::{GrabbableMailbox, GrabberMailbox, PanelMailbox, PokerMailbox};
use crate::registry::Handle;

#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    /// Connection that created the app.
    pub client_id: Uuid,
    pub gadgets: Vec<Handle>,
}

impl App {
    #[must_use]
    pub fn new(name: impl Into<String>, client_id: Uuid) -> Self {
        Self { name: name.into(), client_id, gadgets: Vec::new() }
    }
}

/// A client-contributed unit of scene content plus its interaction mailboxes.
#[derive(Debug)]
pub struct Gadget {
    pub name: String,
    pub client_id: Uuid,
    pub app: Option<Handle>,
    /// Attachment point for node 0: an origin path or a node address.
    pub hook: String,
    /// Latest submitted scene graph, replaced wholesale on update.
    pub nodes: Vec<SceneNode>,
    pub texture: Option<TextureInfo>,
    pub pokers: HashMap<u32, PokerMailbox>,
    pub panels: HashMap<u32, PanelMailbox>,
    pub grabbers: HashMap<u32, GrabberMailbox>,
    pub grabbables: HashMap<u32, GrabbableMailbox>,
    pub models: Vec<Handle>,
}

impl Gadget {
    #[must_use]
    pub fn new(name: impl Into<String>, client_id: Uuid, app: Option<Handle>, hook: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_id,
            app,
            hook: hook.into(),
            nodes: Vec::new(),
            texture: None,
            pokers: HashMap::new(),
            panels: HashMap::new(),
            grabbers: HashMap::new(),
            grabbables: HashMap::new(),
            models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub uri: String,
    pub gadget: Handle,
    pub transform: Transform,
    /// Parent path the transform is relative to, e.g. `/user/hand/right`.
    pub parent: String,
}

impl ModelInstance {
    #[must_use]
    pub fn new(uri: impl Into<String>, gadget: Handle) -> Self {
        Self { uri: uri.into(), gadget, transform: Transform::default(), parent: String::new() }
    }
}
