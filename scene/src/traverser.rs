//! Frame traversal: walks every gadget root once per rendered frame.
//!
//! ## Frame lifecycle
//!
//! 1. **Begin**: clear the visited set, per-node hand map, and both testers'
//!    volumes (active grabs survive).
//! 2. **Walk**: depth-first from node 0 of each root. Each node records a
//!    pending transform and, where it produces output, a [`Deferred`] action.
//! 3. **Resolve**: the pending table resolves parent-before-child and hands
//!    each deferred action its final universe matrix.
//! 4. **End**: the testers run and their results go to the
//!    [`InteractionSink`]. Resolved matrices become the previous frame.
//!
//! Grab anchors are the one piece of state that outlives a frame: once
//! [`Traverser::start_grab`] freezes a grabbable relative to a grabber, the
//! grabbable follows the grabber instead of its own parent until
//! [`Traverser::end_grab`].

#[cfg(test)]
#[path = "traverser_test.rs"]
mod traverser_test;

use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec3};
use tracing::{debug, warn};
use wire::scene::{FrameRoot, NodeType, SceneFrame, SceneNode, TextureInfo, Volume};
use wire::{EndpointAddr, EndpointType, GlobalId, addr};

use crate::collision::CollisionTester;
use crate::consts::{PANEL_QUAD_INVERTED_URI, PANEL_QUAD_URI};
use crate::hand::Hand;
use crate::intersection::IntersectionTester;
use crate::pending::PendingTransforms;
use crate::pose::{Pose, y_axis_scale};
use crate::renderer::{InteractionSink, ModelHandle, Renderer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrabError {
    #[error("node {0:#x} has no transform from the previous frame")]
    MissingTransform(GlobalId),
}

/// Work a node hands to the resolver, run once its universe matrix is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deferred {
    Draw { model: ModelHandle },
    Panel { model: Option<ModelHandle>, interactive: bool, hand: Hand },
    Poker { hand: Hand },
    Handle { grabbable: GlobalId, volume: Volume, hand: Hand },
    Grabber { radius: f32, hand: Hand },
    Hook { radius: f32, hand: Hand },
}

/// A grabbable frozen relative to the grabber holding it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabAnchor {
    pub parent: GlobalId,
    pub parent_from_node: Mat4,
}

#[derive(Debug, Clone)]
struct CachedModel {
    uri: String,
    handle: ModelHandle,
}

/// Where a node hangs: directly in universe space or under another node.
#[derive(Debug, Clone, Copy)]
enum Parent {
    Universe(Mat4),
    Node(GlobalId),
}

/// Inherited state while descending one root.
#[derive(Debug, Clone, Copy)]
struct Context<'a> {
    gadget_id: u32,
    hand: Hand,
    grabbable: Option<GlobalId>,
    texture: Option<&'a TextureInfo>,
}

#[derive(Debug, Default)]
pub struct Traverser {
    pending: PendingTransforms<Deferred>,
    intersections: IntersectionTester,
    collisions: CollisionTester,
    anchors: HashMap<GlobalId, GrabAnchor>,
    models: HashMap<GlobalId, CachedModel>,
    node_hands: HashMap<GlobalId, Hand>,
    visited: HashSet<GlobalId>,
}

impl Traverser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk one frame, draw it, and report interactions to `sink`.
    pub fn traverse(&mut self, frame: &SceneFrame, renderer: &mut dyn Renderer, sink: &mut dyn InteractionSink) {
        self.begin_frame();

        // Roots hooked to another gadget's node inherit that node's hand, so
        // they wait until their target has been walked.
        let mut hooked: Vec<&FrameRoot> = Vec::new();
        for root in &frame.roots {
            if node_hook(&root.hook).is_some() {
                hooked.push(root);
            } else {
                self.traverse_root(frame, root, renderer);
            }
        }
        loop {
            let waiting = hooked.len();
            hooked.retain(|root| {
                let ready = node_hook(&root.hook).is_some_and(|target| self.node_hands.contains_key(&target));
                if ready {
                    self.traverse_root(frame, root, renderer);
                }
                !ready
            });
            if hooked.is_empty() || hooked.len() == waiting {
                break;
            }
        }
        for root in hooked {
            debug!(gadget_id = root.source_id, hook = %root.hook, "hook target not in frame");
            self.traverse_root(frame, root, renderer);
        }

        let Self { pending, intersections, collisions, .. } = self;
        pending.resolve_all(&mut |node, deferred, universe_from_node: &Mat4| {
            apply_deferred(node, deferred, universe_from_node, renderer, intersections, collisions);
        });

        for result in self.intersections.update_proximity() {
            sink.push_poker_proximity(result.poker_id, result.proximity);
        }
        for result in self.collisions.update_grabber_intersections() {
            sink.push_grab_intersections(result);
        }

        self.pending.end_frame();
        let visited = &self.visited;
        self.models.retain(|node, _| visited.contains(node));
    }

    /// Freeze `grabbable` relative to `grabber` using last frame's poses.
    ///
    /// # Errors
    ///
    /// Returns [`GrabError::MissingTransform`] if either node was not resolved
    /// in the previous frame.
    pub fn start_grab(&mut self, grabber: GlobalId, grabbable: GlobalId) -> Result<(), GrabError> {
        let universe_from_grabber =
            self.pending.previous_universe_from_node(grabber).ok_or(GrabError::MissingTransform(grabber))?;
        let universe_from_grabbable =
            self.pending.previous_universe_from_node(grabbable).ok_or(GrabError::MissingTransform(grabbable))?;
        let parent_from_node = universe_from_grabber.inverse() * universe_from_grabbable;
        self.anchors.insert(grabbable, GrabAnchor { parent: grabber, parent_from_node });
        self.collisions.start_grab(grabber, grabbable);
        debug!(grabber, grabbable, "grab started");
        Ok(())
    }

    /// Release a grab. Returns whether an anchor existed.
    pub fn end_grab(&mut self, grabber: GlobalId, grabbable: GlobalId) -> bool {
        self.collisions.end_grab(grabber);
        let existed = self.anchors.remove(&grabbable).is_some();
        debug!(grabber, grabbable, existed, "grab ended");
        existed
    }

    #[must_use]
    pub fn anchor(&self, grabbable: GlobalId) -> Option<&GrabAnchor> {
        self.anchors.get(&grabbable)
    }

    /// Last frame's universe pose of a node.
    #[must_use]
    pub fn universe_from_node(&self, node: GlobalId) -> Option<Mat4> {
        self.pending.previous_universe_from_node(node)
    }

    /// Route a haptic pulse to whichever hand `target` hung from last frame.
    /// Returns false when the node is unknown or not under a hand.
    pub fn send_haptic(
        &self,
        renderer: &mut dyn Renderer,
        target: &EndpointAddr,
        amplitude: f32,
        frequency: f32,
        duration: f32,
    ) -> bool {
        let Some(node) = target.global_id() else {
            return false;
        };
        match self.node_hands.get(&node).copied().unwrap_or_default() {
            Hand::Invalid => false,
            hand => {
                renderer.send_haptic_event_for_hand(hand, amplitude, frequency, duration);
                true
            }
        }
    }

    fn begin_frame(&mut self) {
        self.visited.clear();
        self.node_hands.clear();
        self.intersections.reset();
        self.collisions.reset();
    }

    fn traverse_root(&mut self, frame: &SceneFrame, root: &FrameRoot, renderer: &mut dyn Renderer) {
        let nodes: HashMap<u32, &SceneNode> = root.nodes.iter().map(|n| (n.id, n)).collect();
        let Some(node0) = nodes.get(&0) else {
            warn!(gadget_id = root.source_id, "frame root has no node 0; skipping");
            return;
        };
        let (parent, hand) = self.hook_parent(&root.hook, renderer);
        let ctx = Context { gadget_id: root.source_id, hand, grabbable: None, texture: frame.texture_for(root.source_id) };
        self.traverse_node(&nodes, node0, parent, ctx, renderer);
    }

    /// Resolve a root's hook into its parent and starting hand.
    fn hook_parent(&self, hook: &str, renderer: &dyn Renderer) -> (Parent, Hand) {
        if hook.is_empty() {
            return (Parent::Universe(Mat4::IDENTITY), Hand::Invalid);
        }
        if let Ok(addr) = hook.parse::<EndpointAddr>() {
            if addr.kind == EndpointType::Node {
                let node = addr::compose(addr.endpoint_id, addr.node_id);
                let hand = self.node_hands.get(&node).copied().unwrap_or_default();
                return (Parent::Node(node), hand);
            }
            warn!(hook, "hook address is not a node; anchoring at universe origin");
            return (Parent::Universe(Mat4::IDENTITY), Hand::Invalid);
        }
        let universe_from_origin = renderer.universe_from_origin(hook).unwrap_or_else(|| {
            debug!(hook, "unknown hook origin; using identity");
            Mat4::IDENTITY
        });
        (Parent::Universe(universe_from_origin), Hand::from_origin(hook))
    }

    fn place(&mut self, node: GlobalId, parent: Parent, local: Mat4, apply: Option<Deferred>) {
        match parent {
            Parent::Universe(universe_from_parent) => self.pending.update(node, None, universe_from_parent * local, apply),
            Parent::Node(parent) => self.pending.update(node, Some(parent), local, apply),
        }
    }

    fn traverse_node(
        &mut self,
        nodes: &HashMap<u32, &SceneNode>,
        node: &SceneNode,
        parent: Parent,
        ctx: Context<'_>,
        renderer: &mut dyn Renderer,
    ) {
        let key = addr::compose(ctx.gadget_id, node.id);
        if !self.visited.insert(key) {
            debug!(gadget_id = ctx.gadget_id, node_id = node.id, "node already visited this frame");
            return;
        }

        self.place(key, parent, Mat4::IDENTITY, None);
        let mut child_ctx = ctx;

        match node.kind {
            NodeType::Container => {}
            NodeType::Origin => {
                let origin = node.prop_origin.as_deref().unwrap_or_default();
                let universe_from_origin = renderer.universe_from_origin(origin).unwrap_or_else(|| {
                    debug!(origin, "unknown origin; using identity");
                    Mat4::IDENTITY
                });
                self.pending.update(key, None, universe_from_origin, None);
                child_ctx.hand = Hand::from_origin(origin);
            }
            NodeType::Transform => {
                let local = node.prop_transform.map_or(Mat4::IDENTITY, |t| Pose::from_wire(&t).to_mat4());
                self.place(key, parent, local, None);
            }
            NodeType::Model => match node.prop_model_uri.as_deref() {
                Some(uri) => {
                    if let Some(model) = self.ensure_model(key, uri, renderer) {
                        self.pending.set_apply(key, Deferred::Draw { model });
                    }
                }
                None => warn!(node = key, "model node has no uri"),
            },
            NodeType::Panel => {
                let uri = if ctx.texture.is_some_and(|t| t.invert_y) { PANEL_QUAD_INVERTED_URI } else { PANEL_QUAD_URI };
                let model = self.ensure_model(key, uri, renderer);
                if let (Some(model), Some(texture)) = (model, ctx.texture) {
                    renderer.set_panel_texture(model, texture);
                }
                let interactive = node.prop_interactive.unwrap_or(false);
                self.pending.set_apply(key, Deferred::Panel { model, interactive, hand: ctx.hand });
            }
            NodeType::Poker => self.pending.set_apply(key, Deferred::Poker { hand: ctx.hand }),
            NodeType::Grabbable => {
                if let Some(anchor) = self.anchors.get(&key).copied() {
                    self.pending.update(key, Some(anchor.parent), anchor.parent_from_node, None);
                }
                child_ctx.grabbable = Some(key);
            }
            NodeType::Handle => match (ctx.grabbable, node.prop_volume) {
                (Some(grabbable), Some(volume)) => {
                    self.pending.set_apply(key, Deferred::Handle { grabbable, volume, hand: ctx.hand });
                }
                (None, _) => warn!(node = key, "handle outside any grabbable"),
                (_, None) => warn!(node = key, "handle has no volume"),
            },
            NodeType::Grabber => match node.prop_volume {
                Some(Volume::Sphere { radius }) => {
                    self.pending.set_apply(key, Deferred::Grabber { radius, hand: ctx.hand });
                }
                Some(Volume::Box { .. }) => warn!(node = key, "box grabbers are not supported"),
                None => warn!(node = key, "grabber has no volume"),
            },
            NodeType::Hook => match node.prop_volume {
                Some(Volume::Sphere { radius }) => {
                    self.pending.set_apply(key, Deferred::Hook { radius, hand: ctx.hand });
                }
                Some(Volume::Box { .. }) => warn!(node = key, "box hooks are not supported"),
                None => warn!(node = key, "hook has no volume"),
            },
        }

        self.node_hands.insert(key, child_ctx.hand);

        for child_id in &node.children {
            match nodes.get(child_id) {
                Some(child) => self.traverse_node(nodes, child, Parent::Node(key), child_ctx, renderer),
                None => warn!(gadget_id = ctx.gadget_id, node_id = node.id, child_id, "child not found in root"),
            }
        }
    }

    fn ensure_model(&mut self, node: GlobalId, uri: &str, renderer: &mut dyn Renderer) -> Option<ModelHandle> {
        if let Some(cached) = self.models.get(&node) {
            if cached.uri == uri {
                return Some(cached.handle);
            }
        }
        match renderer.create_model_instance(uri) {
            Ok(handle) => {
                self.models.insert(node, CachedModel { uri: uri.to_owned(), handle });
                Some(handle)
            }
            Err(e) => {
                warn!(node, error = %e, "model instance creation failed");
                self.models.remove(&node);
                None
            }
        }
    }
}

/// The node a hook string names, if it is a node address.
fn node_hook(hook: &str) -> Option<GlobalId> {
    match hook.parse::<EndpointAddr>() {
        Ok(addr) if addr.kind == EndpointType::Node => Some(addr::compose(addr.endpoint_id, addr.node_id)),
        _ => None,
    }
}

fn apply_deferred(
    node: GlobalId,
    deferred: Deferred,
    universe_from_node: &Mat4,
    renderer: &mut dyn Renderer,
    intersections: &mut IntersectionTester,
    collisions: &mut CollisionTester,
) {
    match deferred {
        Deferred::Draw { model } => renderer.add_to_render_list(model, universe_from_node),
        Deferred::Panel { model, interactive, hand } => {
            if let Some(model) = model {
                renderer.add_to_render_list(model, universe_from_node);
            }
            if interactive {
                intersections.add_active_panel(
                    node,
                    universe_from_node.inverse(),
                    y_axis_scale(universe_from_node),
                    hand,
                );
            }
        }
        Deferred::Poker { hand } => {
            let position = universe_from_node.transform_point3(Vec3::ZERO);
            intersections.add_active_poker(node, position, renderer.is_grab_pressed(hand), hand);
        }
        Deferred::Handle { grabbable, volume, hand } => match volume {
            Volume::Sphere { radius } => {
                collisions.add_grabbable_handle_sphere(grabbable, node, universe_from_node, radius, hand);
            }
            Volume::Box { min, max } => collisions.add_grabbable_handle_box(
                grabbable,
                node,
                universe_from_node,
                Vec3::new(min.x, min.y, min.z),
                Vec3::new(max.x, max.y, max.z),
                hand,
            ),
        },
        Deferred::Grabber { radius, hand } => {
            let pressed = renderer.is_grab_pressed(hand);
            collisions.add_grabber_sphere(node, &universe_from_node.inverse(), radius, pressed, hand);
        }
        Deferred::Hook { radius, hand } => collisions.add_hook_sphere(node, universe_from_node, radius, hand),
    }
}
