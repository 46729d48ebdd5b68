//! Per-frame scene resolution and interaction detection for gadget frames.
//!
//! This crate runs on the renderer side of a session. Each broadcast
//! [`wire::SceneFrame`] is walked once by the [`traverser::Traverser`], which
//! feeds the lazy transform table, asks the renderer collaborator to draw
//! models, and registers interaction participants with the two testers. At the
//! end of the frame the testers report what touches what, and the results are
//! handed to an [`renderer::InteractionSink`] for delivery to gadget mailboxes.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`traverser`] | Frame walk, node dispatch, grab anchors |
//! | [`pending`] | Lazy parent-before-child transform resolution |
//! | [`intersection`] | Poker ↔ panel proximity |
//! | [`collision`] | Grabber ↔ grabbable/hook volume overlap |
//! | [`pose`] | Wire transform ↔ matrix conversion |
//! | [`hand`] | Hand context and same-hand exclusion |
//! | [`renderer`] | Collaborator traits implemented by the host |
//! | [`consts`] | Shared numeric constants and well-known paths |

pub mod collision;
pub mod consts;
pub mod hand;
pub mod intersection;
pub mod pending;
pub mod pose;
pub mod renderer;
pub mod traverser;
