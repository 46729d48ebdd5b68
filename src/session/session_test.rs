use wire::addr::compose;
use wire::events::{GrabEventType, GrabbableIntersection, PanelMouseEventType};
use wire::scene::{NodeType, Quat, Vec3};

use super::*;
use crate::registry::FIRST_HANDLE;

struct Quiet;

#[async_trait::async_trait]
impl FrameListener for Quiet {
    async fn new_frame(&self, _frame: Arc<SceneFrame>) -> Result<(), crate::services::broadcast::ListenerError> {
        Ok(())
    }
}

fn session() -> Session {
    Session::new(".")
}

fn proximity(panel_id: GlobalId, u: f32) -> PokerProximity {
    PokerProximity { panel_id, u, v: 0.5, dist: 0.05 }
}

// =============================================================================
// APPS & GADGETS
// =============================================================================

#[test]
fn app_gadget_lifecycle() {
    let mut s = session();
    let client = Uuid::new_v4();
    let app = s.create_app(client, "fnord").expect("app");
    let gadget = s.create_gadget(client, "foo", "/user/hand/left", Some(app)).expect("gadget");

    assert_eq!(s.gadget_name(gadget).expect("name"), "foo");
    assert_eq!(s.app_gadgets(app).expect("gadgets"), &[gadget]);

    s.destroy_gadget(gadget).expect("destroy");
    assert!(s.app_gadgets(app).expect("gadgets").is_empty());
    assert!(s.gadget_name(gadget).is_err());
}

#[test]
fn handles_start_above_reserved_range() {
    let mut s = session();
    let app = s.create_app(Uuid::new_v4(), "a").expect("app");
    assert!(app >= FIRST_HANDLE);
}

#[test]
fn empty_names_are_invalid() {
    let mut s = session();
    let client = Uuid::new_v4();
    let err = s.create_app(client, "").expect_err("empty app name");
    assert_eq!(err.error_code(), "E_INVALID_PARAMETER");
    assert!(s.create_gadget(client, "", "", None).is_err());
}

#[test]
fn gadget_under_unknown_app_is_rejected() {
    let mut s = session();
    let err = s.create_gadget(Uuid::new_v4(), "foo", "", Some(999)).expect_err("unknown app");
    assert!(matches!(err, SessionError::InvalidParameter(_)));
}

#[test]
fn destroying_app_detaches_gadgets() {
    let mut s = session();
    let client = Uuid::new_v4();
    let app = s.create_app(client, "fnord").expect("app");
    let gadget = s.create_gadget(client, "foo", "", Some(app)).expect("gadget");

    s.destroy_app(app).expect("destroy app");
    assert!(s.app_gadgets(app).is_err());
    assert_eq!(s.gadget_name(gadget).expect("gadget survives"), "foo");

    // Destroying the now-orphaned gadget must not trip over the missing app.
    s.destroy_gadget(gadget).expect("destroy gadget");
    assert!(s.destroy_app(app).is_err());
}

#[test]
fn gadget_handle_is_not_an_app() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    assert!(s.app_gadgets(gadget).is_err());
    assert!(s.destroy_app(gadget).is_err());
    assert!(s.gadget_name(gadget).is_ok());
}

#[test]
fn gadget_creation_does_not_dirty() {
    let mut s = session();
    s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    assert!(!s.is_dirty());
    assert!(s.take_frame().is_none());
}

// =============================================================================
// MODELS
// =============================================================================

#[test]
fn model_transform_round_trips() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let model = s.create_model_instance(gadget, "file:///tmp/x.glb").expect("model");

    let transform = Transform {
        position: Some(Vec3::new(1.0, 2.0, 3.0)),
        rotation: Some(Quat::new(0.1, 0.2, 0.3, 0.4)),
        scale: Some(Vec3::new(1.5, 2.5, 3.5)),
    };
    s.set_model_transform(model, transform, "/user/hand/right").expect("set");

    let (got, parent) = s.model_transform(model).expect("get");
    assert_eq!(got, transform);
    assert_eq!(parent, "/user/hand/right");
}

#[test]
fn fresh_model_has_empty_transform() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let model = s.create_model_instance(gadget, "file:///tmp/x.glb").expect("model");
    let (transform, parent) = s.model_transform(model).expect("get");
    assert_eq!(transform, Transform::default());
    assert_eq!(parent, "");
}

#[test]
fn destroying_gadget_destroys_its_models() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let kept = s.create_model_instance(gadget, "file:///a.glb").expect("model");
    let dropped = s.create_model_instance(gadget, "file:///b.glb").expect("model");

    s.destroy_model_instance(dropped).expect("destroy model");
    assert!(s.model_transform(dropped).is_err());
    assert!(s.model_transform(kept).is_ok());

    s.destroy_gadget(gadget).expect("destroy gadget");
    assert!(s.model_transform(kept).is_err());
}

#[test]
fn model_needs_live_gadget() {
    let mut s = session();
    assert!(s.create_model_instance(FIRST_HANDLE, "file:///a.glb").is_err());
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    assert!(s.create_model_instance(gadget, "").is_err());
}

// =============================================================================
// MAILBOX ROUTING
// =============================================================================

#[test]
fn poker_proximity_routes_by_global_id() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let poker = compose(gadget, 4);

    assert!(matches!(s.pull_poker(gadget, 4, None), Err(SessionError::Mailbox(MailboxError::NoEvents))));

    s.push_poker_proximity(poker, vec![proximity(compose(gadget, 9), 0.5)]);
    s.push_poker_proximity(poker, vec![proximity(compose(gadget, 9), 0.75)]);

    let set = s.pull_poker(gadget, 4, Some(4)).expect("set");
    assert_eq!(set, vec![proximity(compose(gadget, 9), 0.75)]);
    assert!(s.pull_poker(gadget, 5, None).is_err());
}

#[test]
fn poker_pull_reports_small_buffer() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    s.push_poker_proximity(compose(gadget, 1), vec![proximity(1, 0.5), proximity(2, 0.5)]);

    let err = s.pull_poker(gadget, 1, Some(1)).expect_err("too small");
    assert_eq!(err.error_code(), "E_INSUFFICIENT_BUFFER");
}

#[test]
fn push_to_unknown_gadget_is_dropped() {
    let mut s = session();
    s.push_poker_proximity(compose(500, 1), vec![proximity(1, 0.5)]);
    s.push_grab_intersections(GrabberIntersections { grabber_id: compose(500, 1), ..GrabberIntersections::default() });
    assert!(!s.is_dirty());
}

#[test]
fn destroyed_gadget_mailboxes_are_unreachable() {
    let mut s = session();
    let client = Uuid::new_v4();
    let app = s.create_app(client, "fnord").expect("app");
    let gadget = s.create_gadget(client, "foo", "", Some(app)).expect("gadget");
    s.push_poker_proximity(compose(gadget, 1), vec![proximity(1, 0.5)]);

    s.destroy_gadget(gadget).expect("destroy");
    assert!(matches!(s.pull_poker(gadget, 1, None), Err(SessionError::InvalidParameter(_))));
    assert!(s.app_gadgets(app).expect("app").is_empty());

    // Late pushes from a racing client are swallowed.
    s.push_poker_proximity(compose(gadget, 1), vec![proximity(1, 0.5)]);
}

#[test]
fn panel_events_queue_in_order() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let panel = compose(gadget, 2);
    for kind in [PanelMouseEventType::Enter, PanelMouseEventType::Down] {
        s.push_panel_event(panel, PanelMouseEvent { kind, panel_id: panel, poker_id: 7, x: 0.1, y: 0.2 });
    }
    assert_eq!(s.pull_panel(gadget, 2).map(|e| e.kind).expect("first"), PanelMouseEventType::Enter);
    assert_eq!(s.pull_panel(gadget, 2).map(|e| e.kind).expect("second"), PanelMouseEventType::Down);
    let err = s.pull_panel(gadget, 2).expect_err("drained");
    assert_eq!(err.error_code(), "E_NO_EVENTS");
    assert!(err.retryable());
}

#[test]
fn grab_routing_tracks_counterparts() {
    let mut s = session();
    let client = Uuid::new_v4();
    let hand = s.create_gadget(client, "hand", "/user/hand/right", None).expect("hand");
    let cube = s.create_gadget(client, "cube", "", None).expect("cube");
    let grabber = compose(hand, 1);
    let grabbable = compose(cube, 3);

    s.push_grab_intersections(GrabberIntersections {
        grabber_id: grabber,
        is_pressed: true,
        grabbables: vec![GrabbableIntersection { grabbable_id: grabbable, handle_id: compose(cube, 4) }],
        hooks: Vec::new(),
    });
    s.push_grabbable_event(grabbable, GrabEvent::new(GrabEventType::StartGrab, grabber, grabbable));
    s.push_grabber_event(grabber, GrabEvent::new(GrabEventType::GrabStarted, grabber, grabbable));

    let set = s.pull_grabber_intersections(hand, 1, None).expect("intersections");
    assert!(set.is_pressed);
    assert_eq!(s.pull_grabbable_event(cube, 3).map(|e| e.kind).expect("event"), GrabEventType::StartGrab);
    assert_eq!(s.pull_grabber_event(hand, 1).map(|e| e.kind).expect("event"), GrabEventType::GrabStarted);

    assert_eq!(s.last_counterpart(hand, 1, Counterpart::Grabbable).expect("grabber"), Some(grabbable));
    assert_eq!(s.last_counterpart(cube, 3, Counterpart::Grabber).expect("grabbable"), Some(grabber));
    assert_eq!(s.last_counterpart(cube, 8, Counterpart::Grabber).expect("unknown local"), None);
}

// =============================================================================
// FRAMES
// =============================================================================

#[test]
fn frame_carries_scene_and_textures() {
    let mut s = session();
    let client = Uuid::new_v4();
    let foo = s.create_gadget(client, "foo", "/user/hand/left", None).expect("foo");
    let bar = s.create_gadget(client, "bar", "", None).expect("bar");
    s.update_scene(foo, vec![SceneNode::new(0, NodeType::Container)]).expect("scene");
    let texture = TextureInfo { shared_handle: 42, width: 640, height: 480, ..TextureInfo::default() };
    assert_eq!(s.update_texture(&[bar, 999], &texture), 1);
    s.listen_for_frames(client, Arc::new(Quiet));

    let (frame, listeners) = s.take_frame().expect("dirty");
    assert_eq!(listeners.len(), 1);
    assert_eq!(frame.roots.len(), 2);
    assert_eq!(frame.roots[0].source_id, foo);
    assert_eq!(frame.roots[0].hook, "/user/hand/left");
    assert_eq!(frame.roots[0].nodes.len(), 1);
    assert!(frame.roots[1].nodes.is_empty());
    assert_eq!(frame.gadget_textures.len(), 1);
    assert_eq!(frame.gadget_textures[0].gadget_name, "bar");
    assert_eq!(frame.texture_for(bar), Some(&texture));
    assert!(s.take_frame().is_none());
}

#[test]
fn frame_ids_increase() {
    let mut s = session();
    let gadget = s.create_gadget(Uuid::new_v4(), "foo", "", None).expect("gadget");
    let mut ids = Vec::new();
    for _ in 0..3 {
        s.update_scene(gadget, Vec::new()).expect("scene");
        ids.push(s.take_frame().expect("dirty").0.id);
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn listening_marks_dirty_and_replaces() {
    let mut s = session();
    let client = Uuid::new_v4();
    s.listen_for_frames(client, Arc::new(Quiet));
    s.listen_for_frames(client, Arc::new(Quiet));
    assert_eq!(s.listener_count(), 1);
    assert!(s.is_dirty());
}

#[test]
fn disconnect_removes_only_that_clients_gadgets() {
    let mut s = session();
    let leaving = Uuid::new_v4();
    let staying = Uuid::new_v4();
    let app = s.create_app(leaving, "fnord").expect("app");
    let gone = s.create_gadget(leaving, "gone", "", Some(app)).expect("gone");
    let model = s.create_model_instance(gone, "file:///a.glb").expect("model");
    let kept = s.create_gadget(staying, "kept", "", None).expect("kept");
    s.listen_for_frames(leaving, Arc::new(Quiet));
    s.listen_for_frames(staying, Arc::new(Quiet));
    s.take_frame();

    s.client_disconnected(leaving);

    assert!(s.gadget_name(gone).is_err());
    assert!(s.model_transform(model).is_err());
    assert!(s.gadget_name(kept).is_ok());
    assert!(s.app_gadgets(app).expect("apps survive").is_empty());
    assert_eq!(s.listener_count(), 1);

    let (frame, _) = s.take_frame().expect("dirty after disconnect");
    assert_eq!(frame.roots.len(), 1);
    assert_eq!(frame.roots[0].source_id, kept);
}

#[test]
fn error_codes_cover_taxonomy() {
    assert_eq!(SessionError::Internal("x".into()).error_code(), "E_INTERNAL");
    assert_eq!(SessionError::UnknownSyscall("x:y".into()).error_code(), "E_UNKNOWN_SYSCALL");
    assert_eq!(SessionError::from(RegistryError::Exhausted).error_code(), "E_INTERNAL");
    assert_eq!(
        SessionError::from(ModelSourceError::UnsupportedScheme("https://x".into())).error_code(),
        "E_REQUEST_FAILED"
    );
}
