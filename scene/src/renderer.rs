//! Collaborator traits the host renderer implements.
//!
//! The traverser never touches GPU or device APIs directly. Everything it needs
//! from the outside world goes through [`Renderer`]; everything it produces for
//! gadgets goes through [`InteractionSink`].

use glam::Mat4;
use wire::GlobalId;
use wire::events::{GrabberIntersections, PokerProximity};
use wire::scene::TextureInfo;

use crate::hand::Hand;

/// Opaque renderer-side model instance id.
pub type ModelHandle = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("model load failed for {uri}: {reason}")]
    ModelLoad { uri: String, reason: String },
}

pub trait Renderer {
    /// Instantiate a model from a URI. Called once per model node until the URI changes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ModelLoad`] if the renderer cannot load the model.
    fn create_model_instance(&mut self, uri: &str) -> Result<ModelHandle, RenderError>;

    /// Bind a gadget's shared texture to a panel model.
    fn set_panel_texture(&mut self, model: ModelHandle, texture: &TextureInfo);

    /// Queue a model for drawing this frame at the given pose.
    fn add_to_render_list(&mut self, model: ModelHandle, universe_from_model: &Mat4);

    /// Whether the grab button on `hand` is held. `Hand::Invalid` is never pressed.
    fn is_grab_pressed(&self, hand: Hand) -> bool;

    fn send_haptic_event_for_hand(&mut self, hand: Hand, amplitude: f32, frequency: f32, duration: f32);

    /// Tracked pose of a named origin such as `/user/hand/left`.
    fn universe_from_origin(&self, origin: &str) -> Option<Mat4>;
}

/// Destination for per-frame interaction results.
pub trait InteractionSink {
    /// Replace a poker's proximity list.
    fn push_poker_proximity(&mut self, poker_id: GlobalId, proximity: Vec<PokerProximity>);

    /// Replace a grabber's intersection set.
    fn push_grab_intersections(&mut self, intersections: GrabberIntersections);
}
