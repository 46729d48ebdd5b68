#[cfg(test)]
#[path = "collision_test.rs"]
mod collision_test;

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use wire::GlobalId;
use wire::events::{GrabbableIntersection, GrabberIntersections};

use crate::hand::Hand;

/// Handle volume in handle-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandleVolume {
    Sphere { radius: f32 },
    Box { min: Vec3, max: Vec3 },
}

#[derive(Debug, Clone, Copy)]
struct ActiveGrabber {
    id: GlobalId,
    center: Vec3,
    radius: f32,
    pressed: bool,
    hand: Hand,
}

#[derive(Debug, Clone, Copy)]
struct ActiveHandle {
    id: GlobalId,
    center: Vec3,
    handle_from_universe: Mat4,
    volume: HandleVolume,
}

#[derive(Debug, Clone)]
struct ActiveGrabbable {
    id: GlobalId,
    hand: Hand,
    handles: Vec<ActiveHandle>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveHook {
    id: GlobalId,
    center: Vec3,
    radius: f32,
    hand: Hand,
}

/// Grabber ↔ grabbable/hook overlap tester.
///
/// Volumes are re-registered every frame. Active grabs survive [`reset`](Self::reset):
/// a grabber holding something keeps reporting it until the grab ends,
/// regardless of where its volume is.
#[derive(Debug, Default)]
pub struct CollisionTester {
    grabbers: Vec<ActiveGrabber>,
    grabbables: Vec<ActiveGrabbable>,
    hooks: Vec<ActiveHook>,
    active_grabs: HashMap<GlobalId, GlobalId>,
}

impl CollisionTester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear volumes for a new frame. Active grabs are kept.
    pub fn reset(&mut self) {
        self.grabbers.clear();
        self.grabbables.clear();
        self.hooks.clear();
    }

    /// Register a spherical grabber from its inverse universe transform.
    pub fn add_grabber_sphere(
        &mut self,
        id: GlobalId,
        grabber_from_universe: &Mat4,
        radius: f32,
        pressed: bool,
        hand: Hand,
    ) {
        let center = grabber_from_universe.inverse().transform_point3(Vec3::ZERO);
        self.grabbers.push(ActiveGrabber { id, center, radius, pressed, hand });
    }

    pub fn add_grabbable_handle_sphere(
        &mut self,
        grabbable_id: GlobalId,
        handle_id: GlobalId,
        universe_from_handle: &Mat4,
        radius: f32,
        hand: Hand,
    ) {
        self.add_handle(grabbable_id, handle_id, universe_from_handle, HandleVolume::Sphere { radius }, hand);
    }

    pub fn add_grabbable_handle_box(
        &mut self,
        grabbable_id: GlobalId,
        handle_id: GlobalId,
        universe_from_handle: &Mat4,
        min: Vec3,
        max: Vec3,
        hand: Hand,
    ) {
        self.add_handle(grabbable_id, handle_id, universe_from_handle, HandleVolume::Box { min, max }, hand);
    }

    pub fn add_hook_sphere(&mut self, id: GlobalId, universe_from_hook: &Mat4, radius: f32, hand: Hand) {
        let center = universe_from_hook.transform_point3(Vec3::ZERO);
        self.hooks.push(ActiveHook { id, center, radius, hand });
    }

    /// Pin `grabber` to `grabbable` until [`end_grab`](Self::end_grab).
    pub fn start_grab(&mut self, grabber: GlobalId, grabbable: GlobalId) {
        self.active_grabs.insert(grabber, grabbable);
    }

    /// Returns the grabbable the grabber was holding.
    pub fn end_grab(&mut self, grabber: GlobalId) -> Option<GlobalId> {
        self.active_grabs.remove(&grabber)
    }

    #[must_use]
    pub fn active_grab(&self, grabber: GlobalId) -> Option<GlobalId> {
        self.active_grabs.get(&grabber).copied()
    }

    /// One result per registered grabber, in registration order.
    #[must_use]
    pub fn update_grabber_intersections(&self) -> Vec<GrabberIntersections> {
        self.grabbers.iter().map(|grabber| self.intersect(grabber)).collect()
    }

    fn add_handle(
        &mut self,
        grabbable_id: GlobalId,
        handle_id: GlobalId,
        universe_from_handle: &Mat4,
        volume: HandleVolume,
        hand: Hand,
    ) {
        let handle = ActiveHandle {
            id: handle_id,
            center: universe_from_handle.transform_point3(Vec3::ZERO),
            handle_from_universe: universe_from_handle.inverse(),
            volume,
        };
        match self.grabbables.iter_mut().find(|g| g.id == grabbable_id) {
            Some(grabbable) => grabbable.handles.push(handle),
            None => self.grabbables.push(ActiveGrabbable { id: grabbable_id, hand, handles: vec![handle] }),
        }
    }

    fn intersect(&self, grabber: &ActiveGrabber) -> GrabberIntersections {
        let grabbables = match self.active_grabs.get(&grabber.id) {
            Some(&held) => vec![GrabbableIntersection { grabbable_id: held, handle_id: held }],
            None => self
                .grabbables
                .iter()
                .filter(|g| grabber.hand.may_interact(g.hand))
                .filter_map(|g| {
                    g.handles
                        .iter()
                        .find(|h| handle_overlaps(grabber, h))
                        .map(|h| GrabbableIntersection { grabbable_id: g.id, handle_id: h.id })
                })
                .collect(),
        };

        let hooks = self
            .hooks
            .iter()
            .filter(|hook| grabber.hand.may_interact(hook.hand))
            .find(|hook| spheres_overlap(grabber.center, grabber.radius, hook.center, hook.radius))
            .map(|hook| hook.id)
            .into_iter()
            .collect();

        GrabberIntersections { grabber_id: grabber.id, is_pressed: grabber.pressed, grabbables, hooks }
    }
}

fn handle_overlaps(grabber: &ActiveGrabber, handle: &ActiveHandle) -> bool {
    match handle.volume {
        HandleVolume::Sphere { radius } => spheres_overlap(grabber.center, grabber.radius, handle.center, radius),
        HandleVolume::Box { min, max } => {
            let local = handle.handle_from_universe.transform_point3(grabber.center);
            sphere_box_overlap(local, grabber.radius, min, max)
        }
    }
}

/// Strictly closer than the sum of radii.
#[must_use]
pub fn spheres_overlap(a: Vec3, a_radius: f32, b: Vec3, b_radius: f32) -> bool {
    a.distance(b) < a_radius + b_radius
}

/// Sphere against an axis-aligned box, both in the box's space. Touching counts.
#[must_use]
pub fn sphere_box_overlap(center: Vec3, radius: f32, min: Vec3, max: Vec3) -> bool {
    let closest = center.clamp(min.min(max), max.max(min));
    center.distance_squared(closest) <= radius * radius
}
