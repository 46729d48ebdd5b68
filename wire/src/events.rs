//! Interaction event payloads exchanged between the renderer, the session
//! server mailboxes, and gadgets.

use serde::{Deserialize, Serialize};

use crate::addr::{EndpointAddr, GlobalId, deserialize_global_id, deserialize_global_ids};

/// A panel a poker is currently close to, in panel-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokerProximity {
    #[serde(deserialize_with = "deserialize_global_id")]
    pub panel_id: GlobalId,
    pub u: f32,
    pub v: f32,
    /// Signed distance from the panel plane in universe units.
    pub dist: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PanelMouseEventType {
    Enter,
    Leave,
    Down,
    Up,
    Move,
}

/// Pointer event delivered to a panel by a poker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelMouseEvent {
    #[serde(rename = "type")]
    pub kind: PanelMouseEventType,
    #[serde(deserialize_with = "deserialize_global_id")]
    pub panel_id: GlobalId,
    #[serde(deserialize_with = "deserialize_global_id")]
    pub poker_id: GlobalId,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GrabEventType {
    EnterRange,
    LeaveRange,
    StartGrab,
    EndGrab,
    EnterHookRange,
    LeaveHookRange,
    RequestGrab,
    RequestGrabResponse,
    CancelGrab,
    StartGrabFailed,
    GrabStarted,
}

/// Discrete grab lifecycle event. The server routes these but never
/// interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabEvent {
    #[serde(rename = "type")]
    pub kind: GrabEventType,
    #[serde(default)]
    pub sender: EndpointAddr,
    #[serde(default, deserialize_with = "deserialize_global_id")]
    pub grabber_id: GlobalId,
    #[serde(default, deserialize_with = "deserialize_global_id")]
    pub grabbable_id: GlobalId,
    #[serde(default, deserialize_with = "deserialize_global_id")]
    pub hook_id: GlobalId,
    #[serde(default)]
    pub allowed: bool,
}

impl GrabEvent {
    #[must_use]
    pub fn new(kind: GrabEventType, grabber_id: GlobalId, grabbable_id: GlobalId) -> Self {
        Self { kind, sender: EndpointAddr::default(), grabber_id, grabbable_id, hook_id: 0, allowed: false }
    }
}

/// A grabbable whose handle overlaps a grabber this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabbableIntersection {
    #[serde(deserialize_with = "deserialize_global_id")]
    pub grabbable_id: GlobalId,
    #[serde(deserialize_with = "deserialize_global_id")]
    pub handle_id: GlobalId,
}

/// Everything one grabber overlaps this frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabberIntersections {
    #[serde(deserialize_with = "deserialize_global_id")]
    pub grabber_id: GlobalId,
    pub is_pressed: bool,
    pub grabbables: Vec<GrabbableIntersection>,
    #[serde(deserialize_with = "deserialize_global_ids")]
    pub hooks: Vec<GlobalId>,
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
