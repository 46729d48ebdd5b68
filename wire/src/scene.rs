//! Scene graph documents and the per-frame broadcast shape.
//!
//! Gadgets submit a flat list of [`SceneNode`]s (node 0 is the root); the
//! session server bundles every live gadget's list into one immutable
//! [`SceneFrame`] per dirty cycle.

use serde::{Deserialize, Serialize};

/// Three-component vector on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Rotation quaternion on the wire, `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[must_use]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Parent-relative transform. Every field is independently optional;
/// absent fields mean zero translation, identity rotation, unit scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Quat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec3>,
}

/// Collision volume attached to a handle, grabber, or hook node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Volume {
    /// Sphere centred on the node origin.
    Sphere { radius: f32 },
    /// Axis-aligned box in node-local space.
    Box { min: Vec3, max: Vec3 },
}

/// Kind of a scene node. Closed set; the traverser matches it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Container,
    Origin,
    Transform,
    Model,
    Panel,
    Poker,
    Grabbable,
    Handle,
    Grabber,
    Hook,
}

/// One node of a gadget's submitted scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default)]
    pub children: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_model_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_interactive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_volume: Option<Volume>,
}

impl SceneNode {
    /// A bare node of the given kind with no children or properties.
    #[must_use]
    pub fn new(id: u32, kind: NodeType) -> Self {
        Self {
            id,
            kind,
            children: Vec::new(),
            prop_origin: None,
            prop_transform: None,
            prop_model_uri: None,
            prop_interactive: None,
            prop_volume: None,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: impl Into<Vec<u32>>) -> Self {
        self.children = children.into();
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.prop_origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.prop_transform = Some(transform);
        self
    }

    #[must_use]
    pub fn with_model_uri(mut self, uri: impl Into<String>) -> Self {
        self.prop_model_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.prop_interactive = Some(interactive);
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.prop_volume = Some(volume);
        self
    }
}

/// Shared-texture descriptor a gadget renders its panels into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    /// OS-level shared handle for the texture.
    pub shared_handle: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub format: String,
    /// Texture rows are stored bottom-up.
    #[serde(default)]
    pub invert_y: bool,
}

/// One gadget's contribution to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRoot {
    pub nodes: Vec<SceneNode>,
    pub hook: String,
    pub source_id: u32,
}

/// A gadget's shared texture, keyed by gadget name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetTexture {
    pub gadget_name: String,
    pub gadget_id: u32,
    pub texture_info: TextureInfo,
}

/// Immutable merged view of the session, broadcast once per dirty cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFrame {
    pub id: u64,
    pub roots: Vec<FrameRoot>,
    pub gadget_textures: Vec<GadgetTexture>,
}

impl SceneFrame {
    /// Texture descriptor for a gadget, if it published one this frame.
    #[must_use]
    pub fn texture_for(&self, gadget_id: u32) -> Option<&TextureInfo> {
        self.gadget_textures
            .iter()
            .find(|t| t.gadget_id == gadget_id)
            .map(|t| &t.texture_info)
    }
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod tests;
