//! Shared numeric constants for the scene crate.

// ── Proximity band ──────────────────────────────────────────────

/// Lowest accepted panel-local `u`/`v` coordinate for poker proximity.
pub const PROXIMITY_UV_MIN: f32 = 0.1;

/// Highest accepted panel-local `u`/`v` coordinate for poker proximity.
pub const PROXIMITY_UV_MAX: f32 = 1.1;

/// Closest accepted signed distance (behind the panel plane).
pub const PROXIMITY_DIST_MIN: f32 = -0.1;

/// Farthest accepted signed distance (in front of the panel plane).
pub const PROXIMITY_DIST_MAX: f32 = 0.2;

// ── Well-known paths ────────────────────────────────────────────

/// Origin path of the left hand.
pub const LEFT_HAND_ORIGIN: &str = "/user/hand/left";

/// Origin path of the right hand.
pub const RIGHT_HAND_ORIGIN: &str = "/user/hand/right";

/// Built-in unit quad used for panels whose texture rows are top-down.
pub const PANEL_QUAD_URI: &str = "builtin:/panel_quad.glb";

/// Built-in unit quad with flipped texture coordinates.
pub const PANEL_QUAD_INVERTED_URI: &str = "builtin:/panel_quad_inverted.glb";
