//! Pending transforms: lazily resolved universe-from-node matrices.
//!
//! Node handlers run in traversal order, which does not guarantee a parent is
//! visited before its children (hooks may point at a node in another gadget
//! that has not been walked yet). Each handler therefore records a *pending*
//! entry: its parent key, its parent-relative matrix, and an optional apply
//! payload. After traversal the table is resolved. Resolving a node resolves
//! its parent first, so by the time a payload is handed to the apply callback
//! the whole chain up to the universe is fixed.
//!
//! The previous frame's resolved matrices are kept so grab anchors can be
//! computed against the pose the user actually saw.

#[cfg(test)]
#[path = "pending_test.rs"]
mod pending_test;

use std::collections::HashMap;

use glam::Mat4;
use tracing::{debug, warn};
use wire::GlobalId;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Pending,
    InProgress,
    Resolved(Mat4),
}

#[derive(Debug)]
struct PendingTransform<A> {
    parent: Option<GlobalId>,
    parent_from_node: Mat4,
    apply: Option<A>,
    explicitly_set: bool,
    resolution: Resolution,
}

impl<A> PendingTransform<A> {
    fn fallback() -> Self {
        Self {
            parent: None,
            parent_from_node: Mat4::IDENTITY,
            apply: None,
            explicitly_set: false,
            resolution: Resolution::Pending,
        }
    }
}

/// Per-frame table of pending transforms plus the last frame's results.
#[derive(Debug)]
pub struct PendingTransforms<A> {
    current: HashMap<GlobalId, PendingTransform<A>>,
    order: Vec<GlobalId>,
    previous: HashMap<GlobalId, Mat4>,
}

impl<A> Default for PendingTransforms<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> PendingTransforms<A> {
    #[must_use]
    pub fn new() -> Self {
        Self { current: HashMap::new(), order: Vec::new(), previous: HashMap::new() }
    }

    /// Record a node's parent, parent-relative matrix, and apply payload.
    /// A later update for the same node in the same frame replaces the earlier one.
    pub fn update(&mut self, node: GlobalId, parent: Option<GlobalId>, parent_from_node: Mat4, apply: Option<A>) {
        let entry = self.entry(node);
        entry.parent = parent;
        entry.parent_from_node = parent_from_node;
        entry.apply = apply;
        entry.explicitly_set = true;
        entry.resolution = Resolution::Pending;
    }

    /// Replace only the apply payload, keeping parent and matrix.
    pub fn set_apply(&mut self, node: GlobalId, apply: A) {
        self.entry(node).apply = Some(apply);
    }

    /// Resolve one node, resolving its ancestors first. Each payload is
    /// handed to `on_apply` exactly once, after its node's matrix is final.
    pub fn resolve<F>(&mut self, node: GlobalId, on_apply: &mut F) -> Mat4
    where
        F: FnMut(GlobalId, A, &Mat4),
    {
        self.resolve_inner(node, on_apply).unwrap_or(Mat4::IDENTITY)
    }

    /// Resolve every node recorded this frame, in recording order.
    pub fn resolve_all<F>(&mut self, on_apply: &mut F)
    where
        F: FnMut(GlobalId, A, &Mat4),
    {
        let order = self.order.clone();
        for node in order {
            self.resolve_inner(node, on_apply);
        }
    }

    /// Resolved matrix for this frame, if the node has been resolved.
    #[must_use]
    pub fn universe_from_node(&self, node: GlobalId) -> Option<Mat4> {
        match self.current.get(&node)?.resolution {
            Resolution::Resolved(m) => Some(m),
            Resolution::Pending | Resolution::InProgress => None,
        }
    }

    /// Resolved matrix from the previous frame.
    #[must_use]
    pub fn previous_universe_from_node(&self, node: GlobalId) -> Option<Mat4> {
        self.previous.get(&node).copied()
    }

    #[must_use]
    pub fn is_resolved(&self, node: GlobalId) -> bool {
        self.universe_from_node(node).is_some()
    }

    /// Whether a handler recorded this node this frame (as opposed to the
    /// identity fallback created when something referenced it).
    #[must_use]
    pub fn was_set(&self, node: GlobalId) -> bool {
        self.current.get(&node).is_some_and(|e| e.explicitly_set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Close the frame: resolved matrices become the previous frame's table
    /// and the current table is cleared. Unresolved entries are dropped.
    pub fn end_frame(&mut self) {
        self.previous = self
            .current
            .drain()
            .filter_map(|(node, entry)| match entry.resolution {
                Resolution::Resolved(m) => Some((node, m)),
                Resolution::Pending | Resolution::InProgress => None,
            })
            .collect();
        self.order.clear();
    }

    fn entry(&mut self, node: GlobalId) -> &mut PendingTransform<A> {
        let order = &mut self.order;
        self.current.entry(node).or_insert_with(|| {
            order.push(node);
            PendingTransform::fallback()
        })
    }

    /// `None` means the node is already mid-resolution, i.e. a parent cycle.
    fn resolve_inner<F>(&mut self, node: GlobalId, on_apply: &mut F) -> Option<Mat4>
    where
        F: FnMut(GlobalId, A, &Mat4),
    {
        let entry = self.entry(node);
        match entry.resolution {
            Resolution::Resolved(m) => return Some(m),
            Resolution::InProgress => return None,
            Resolution::Pending => {}
        }
        if !entry.explicitly_set {
            debug!(node, "resolving node that was never updated; using identity");
        }
        entry.resolution = Resolution::InProgress;
        let parent = entry.parent;
        let parent_from_node = entry.parent_from_node;

        let universe_from_parent = match parent {
            Some(parent) => {
                let resolved = self.resolve_inner(parent, on_apply);
                if resolved.is_none() {
                    warn!(node, parent, "transform parent cycle; treating parent as absent");
                }
                resolved
            }
            None => None,
        };
        let universe_from_node = universe_from_parent.map_or(parent_from_node, |m| m * parent_from_node);

        let entry = self.entry(node);
        entry.resolution = Resolution::Resolved(universe_from_node);
        if let Some(apply) = entry.apply.take() {
            on_apply(node, apply, &universe_from_node);
        }
        Some(universe_from_node)
    }
}
