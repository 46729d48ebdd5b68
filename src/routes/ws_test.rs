use std::io::Write;

use futures::{SinkExt, StreamExt};
use rand::RngCore;
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wire::addr::compose;

use super::*;
use crate::services::broadcast::publish_if_dirty;
use crate::state::test_helpers;

fn request(syscall: &str, data: Value) -> Envelope {
    let data = match data {
        Value::Object(map) => map.into_iter().collect(),
        _ => Data::new(),
    };
    Envelope::request(syscall, data)
}

/// Dispatch one request as `client_id` and return the single reply.
async fn call(state: &AppState, client_id: Uuid, tx: &mpsc::Sender<Envelope>, syscall: &str, data: Value) -> Envelope {
    let req = request(syscall, data);
    let mut replies = process_inbound(state, client_id, tx, Ok(req.clone())).await;
    assert_eq!(replies.len(), 1, "expected exactly one reply to {syscall}");
    let reply = replies.remove(0);
    assert_eq!(reply.parent_id, Some(req.id));
    assert_eq!(reply.syscall, syscall);
    reply
}

fn assert_done(reply: &Envelope) {
    assert_eq!(reply.status, Status::Done, "unexpected reply: {:?}", reply.data);
}

fn assert_code(reply: &Envelope, code: &str) {
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.data.get("code"), Some(&json!(code)));
}

fn handle_of(reply: &Envelope) -> u32 {
    reply.data.get("handle").and_then(Value::as_u64).and_then(|h| u32::try_from(h).ok()).expect("handle")
}

struct Client {
    state: AppState,
    id: Uuid,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

impl Client {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self { state: test_helpers::test_app_state(), id: Uuid::new_v4(), tx, rx }
    }

    async fn call(&self, syscall: &str, data: Value) -> Envelope {
        call(&self.state, self.id, &self.tx, syscall, data).await
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

#[tokio::test]
async fn app_and_gadget_lifecycle() {
    let client = Client::new();

    let app = client.call("app:create", json!({"name": "fnord"})).await;
    assert_done(&app);
    let app = handle_of(&app);

    let gadget = client.call("gadget:create", json!({"name": "foo", "app": app, "hook": "/user/hand/left"})).await;
    assert_done(&gadget);
    assert_eq!(gadget.data.get("gadgetId"), gadget.data.get("handle"));
    let gadget = handle_of(&gadget);

    let name = client.call("gadget:name", json!({"handle": gadget})).await;
    assert_eq!(name.data.get("name"), Some(&json!("foo")));

    let listed = client.call("app:gadgets", json!({"handle": app})).await;
    assert_eq!(listed.data.get("gadgets"), Some(&json!([gadget])));

    assert_done(&client.call("gadget:destroy", json!({"handle": gadget})).await);
    let listed = client.call("app:gadgets", json!({"handle": app})).await;
    assert_eq!(listed.data.get("gadgets"), Some(&json!([])));

    assert_done(&client.call("app:destroy", json!({"handle": app})).await);
    assert_code(&client.call("app:destroy", json!({"handle": app})).await, "E_INVALID_PARAMETER");
}

#[tokio::test]
async fn unknown_syscalls_are_rejected() {
    let client = Client::new();
    assert_code(&client.call("teapot:brew", json!({})).await, "E_UNKNOWN_SYSCALL");
    assert_code(&client.call("gadget:explode", json!({})).await, "E_UNKNOWN_SYSCALL");
}

#[tokio::test]
async fn missing_fields_are_invalid_parameters() {
    let client = Client::new();
    assert_code(&client.call("app:create", json!({})).await, "E_INVALID_PARAMETER");
    assert_code(&client.call("gadget:name", json!({"handle": "twelve"})).await, "E_INVALID_PARAMETER");
    assert_code(&client.call("poker:pull", json!({"gadgetId": 12})).await, "E_INVALID_PARAMETER");
}

#[tokio::test]
async fn malformed_envelope_gets_gateway_error() {
    let client = Client::new();
    let replies = process_inbound(&client.state, client.id, &client.tx, Envelope::from_json("{not json")).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].syscall, "gateway:error");
}

#[tokio::test]
async fn non_requests_are_ignored() {
    let client = Client::new();
    let mut req = request("app:create", json!({"name": "x"}));
    req.status = Status::Done;
    assert!(process_inbound(&client.state, client.id, &client.tx, Ok(req)).await.is_empty());
}

#[tokio::test]
async fn model_transform_round_trips_over_envelopes() {
    let client = Client::new();
    let gadget = handle_of(&client.call("gadget:create", json!({"name": "foo"})).await);
    let model = client.call("model:create", json!({"gadget": gadget, "uri": "file:///tmp/x.glb"})).await;
    let model = handle_of(&model);

    let transform = json!({
        "position": {"x": 1.0, "y": 2.0, "z": 3.0},
        "rotation": {"x": 0.1, "y": 0.2, "z": 0.3, "w": 0.4},
        "scale": {"x": 1.5, "y": 2.5, "z": 3.5},
    });
    let set = client
        .call("model:set_transform", json!({"handle": model, "transform": transform, "parent": "/user/hand/right"}))
        .await;
    assert_done(&set);

    let got = client.call("model:get_transform", json!({"handle": model})).await;
    let round: Transform = serde_json::from_value(got.data["transform"].clone()).expect("transform");
    let expected: Transform = serde_json::from_value(transform).expect("expected");
    assert_eq!(round, expected);
    assert_eq!(got.data.get("parent"), Some(&json!("/user/hand/right")));

    assert_done(&client.call("model:destroy", json!({"handle": model})).await);
    assert_code(&client.call("model:get_transform", json!({"handle": model})).await, "E_INVALID_PARAMETER");
}

#[tokio::test]
async fn model_source_returns_base64_bytes() {
    let mut bytes = vec![0u8; 512];
    rand::rng().fill_bytes(&mut bytes);
    let mut file = tempfile::Builder::new().suffix(".glb").tempfile().expect("tempfile");
    file.write_all(&bytes).expect("write");
    let uri = format!("file://{}", file.path().display());

    let client = Client::new();
    let reply = client.call("model:source", json!({"uri": uri})).await;
    assert_done(&reply);
    assert_eq!(reply.data.get("uri"), Some(&json!(uri)));
    let encoded = reply.data.get("data").and_then(Value::as_str).expect("data");
    assert_eq!(BASE64.decode(encoded).expect("base64"), bytes);

    let remote = client.call("model:source", json!({"uri": "https://example.com/x.glb"})).await;
    assert_code(&remote, "E_REQUEST_FAILED");
}

#[tokio::test]
async fn poker_proximity_push_then_pull() {
    let client = Client::new();
    let gadget = handle_of(&client.call("gadget:create", json!({"name": "hand"})).await);

    let empty = client.call("poker:pull", json!({"gadgetId": gadget, "localId": 1})).await;
    assert_done(&empty);
    assert_eq!(empty.data.get("event"), Some(&Value::Null));

    let proximity = json!([
        {"panelId": compose(gadget, 5), "u": 0.5, "v": 0.5, "dist": 0.05},
        {"panelId": compose(gadget, 6), "u": 0.25, "v": 0.75, "dist": 0.0},
    ]);
    let push = client.call("poker:push_proximity", json!({"pokerId": compose(gadget, 1), "proximity": proximity})).await;
    assert_done(&push);

    let small = client.call("poker:pull", json!({"gadgetId": gadget, "localId": 1, "capacity": 1})).await;
    assert_code(&small, "E_INSUFFICIENT_BUFFER");

    let pulled = client.call("poker:pull", json!({"gadgetId": gadget, "localId": 1, "capacity": 2})).await;
    assert_eq!(pulled.data.get("event").and_then(Value::as_array).map(Vec::len), Some(2));
}

#[tokio::test]
async fn grab_events_route_and_remember_counterparts() {
    let client = Client::new();
    let hand = handle_of(&client.call("gadget:create", json!({"name": "hand"})).await);
    let cube = handle_of(&client.call("gadget:create", json!({"name": "cube"})).await);
    let grabber = compose(hand, 1);
    let grabbable = compose(cube, 2);

    let push = client
        .call(
            "grabber:push_intersections",
            json!({
                "grabberId": grabber,
                "isPressed": true,
                "grabbables": [{"grabbableId": grabbable, "handleId": compose(cube, 3)}],
            }),
        )
        .await;
    assert_done(&push);
    let event = json!({"type": "startGrab", "grabberId": grabber, "grabbableId": grabbable});
    assert_done(&client.call("grabbable:push_event", json!({"grabbableId": grabbable, "event": event})).await);

    let set = client.call("grabber:pull_intersections", json!({"gadgetId": hand, "localId": 1})).await;
    assert_eq!(set.data["event"]["isPressed"], json!(true));
    assert_eq!(set.data["event"]["hooks"], json!([]));

    let pulled = client.call("grabbable:pull_event", json!({"gadgetId": cube, "localId": 2})).await;
    assert_eq!(pulled.data["event"]["type"], json!("startGrab"));
    let drained = client.call("grabbable:pull_event", json!({"gadgetId": cube, "localId": 2})).await;
    assert_eq!(drained.data.get("event"), Some(&Value::Null));

    let last = client.call("session:last_counterpart", json!({"gadgetId": hand, "localId": 1, "kind": "grabber"})).await;
    assert_eq!(last.data.get("counterpart"), Some(&json!(grabbable)));
    let last = client.call("session:last_counterpart", json!({"gadgetId": cube, "localId": 2, "kind": "grabbable"})).await;
    assert_eq!(last.data.get("counterpart"), Some(&json!(grabber)));
    let bad = client.call("session:last_counterpart", json!({"gadgetId": cube, "localId": 2, "kind": "poker"})).await;
    assert_code(&bad, "E_INVALID_PARAMETER");
}

#[tokio::test]
async fn global_ids_accepted_as_decimal_strings() {
    let client = Client::new();
    let hand = handle_of(&client.call("gadget:create", json!({"name": "hand"})).await);
    let grabber = compose(hand, 1);
    let hook = compose(u32::MAX, u32::MAX);

    // Encoded and decoded as protobuf, the way a binary client sends it.
    let req = request(
        "grabber:push_intersections",
        json!({"grabberId": grabber.to_string(), "isPressed": false, "hooks": [hook]}),
    );
    let req = Envelope::from_bytes(&req.to_bytes()).expect("decode");
    let replies = process_inbound(&client.state, client.id, &client.tx, Ok(req)).await;
    assert_done(&replies[0]);

    let set = client.call("grabber:pull_intersections", json!({"gadgetId": hand, "localId": 1})).await;
    assert_eq!(set.data["event"]["hooks"], json!([hook]));

    let bad = client.call("grabber:push_intersections", json!({"grabberId": grabber, "hooks": ["nope"]})).await;
    assert_code(&bad, "E_INVALID_PARAMETER");
}

#[tokio::test]
async fn panel_events_are_fifo() {
    let client = Client::new();
    let gadget = handle_of(&client.call("gadget:create", json!({"name": "browser"})).await);
    let panel = compose(gadget, 3);
    for kind in ["enter", "down", "up"] {
        let event = json!({"type": kind, "panelId": panel, "pokerId": 99, "x": 0.5, "y": 0.5});
        assert_done(&client.call("panel:push_event", json!({"panelId": panel, "event": event})).await);
    }
    for kind in ["enter", "down", "up"] {
        let pulled = client.call("panel:pull", json!({"gadgetId": gadget, "localId": 3})).await;
        assert_eq!(pulled.data["event"]["type"], json!(kind));
    }
}

#[tokio::test]
async fn frame_listen_delivers_frames() {
    let mut client = Client::new();
    let gadget = handle_of(&client.call("gadget:create", json!({"name": "foo", "hook": "/user/hand/right"})).await);
    let nodes = json!([{"id": 0, "type": "container", "children": [1]}, {"id": 1, "type": "poker"}]);
    assert_done(&client.call("gadget:update_scene", json!({"gadgetId": gadget, "nodes": nodes})).await);
    assert_done(&client.call("frame:listen", json!({})).await);

    assert_eq!(publish_if_dirty(&client.state).await, Some(1));
    let frame = timeout(Duration::from_millis(500), client.rx.recv())
        .await
        .expect("frame within timeout")
        .expect("channel open");
    assert_eq!(frame.syscall, FRAME_SYSCALL);
    assert_eq!(frame.data["frame"]["roots"][0]["sourceId"], json!(gadget));
    assert_eq!(frame.data["frame"]["roots"][0]["hook"], json!("/user/hand/right"));
    assert_eq!(frame.data["frame"]["roots"][0]["nodes"][1]["type"], json!("poker"));
}

#[tokio::test]
async fn texture_update_reports_count() {
    let client = Client::new();
    let gadget = handle_of(&client.call("gadget:create", json!({"name": "foo"})).await);
    let texture = json!({"sharedHandle": 7, "width": 1024, "height": 768, "format": "bgra8", "invertY": true});
    let reply = client.call("gadget:update_texture", json!({"gadgetIds": [gadget, 4000], "texture": texture})).await;
    assert_eq!(reply.data.get("updated"), Some(&json!(1)));
}

// =============================================================================
// END TO END
// =============================================================================

async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, crate::routes::app(state)).await });
    addr
}

async fn next_message<S>(stream: &mut S) -> WsMessage
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("message within timeout")
        .expect("stream open")
        .expect("valid message")
}

#[tokio::test]
async fn websocket_round_trip_and_disconnect_cleanup() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.expect("connect");
    let (mut sink, mut stream) = socket.split();

    // Welcome arrives as protobuf before the client has spoken.
    let WsMessage::Binary(bytes) = next_message(&mut stream).await else {
        panic!("expected binary welcome");
    };
    let welcome = Envelope::from_bytes(&bytes).expect("welcome");
    assert_eq!(welcome.syscall, "session:connected");
    assert!(welcome.data.contains_key("clientId"));

    // Text in, text out.
    let create = request("gadget:create", json!({"name": "foo"}));
    sink.send(WsMessage::Text(create.to_json().expect("json").into())).await.expect("send");
    let WsMessage::Text(text) = next_message(&mut stream).await else {
        panic!("expected text reply");
    };
    let reply = Envelope::from_json(text.as_str()).expect("reply");
    assert_eq!(reply.parent_id, Some(create.id));
    assert_eq!(reply.status, Status::Done);
    let gadget = handle_of(&reply);
    assert!(state.session.lock().await.gadget_name(gadget).is_ok());

    // Binary in, binary out.
    let name = request("gadget:name", json!({"handle": gadget}));
    sink.send(WsMessage::Binary(name.to_bytes().into())).await.expect("send");
    let WsMessage::Binary(bytes) = next_message(&mut stream).await else {
        panic!("expected binary reply");
    };
    let reply = Envelope::from_bytes(&bytes).expect("reply");
    assert_eq!(reply.data.get("name"), Some(&json!("foo")));

    sink.send(WsMessage::Close(None)).await.expect("close");
    drop(sink);
    drop(stream);

    timeout(Duration::from_secs(2), async {
        while state.session.lock().await.gadget_name(gadget).is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("gadget removed after disconnect");
}

#[tokio::test]
async fn websocket_listener_receives_frames_from_loop() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let frames = crate::services::broadcast::spawn_frame_loop(state.clone());
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.expect("connect");
    let (mut sink, mut stream) = socket.split();
    next_message(&mut stream).await;

    let listen = request("frame:listen", json!({}));
    sink.send(WsMessage::Binary(listen.to_bytes().into())).await.expect("send");

    let mut saw_done = false;
    let mut frame_id = None;
    while frame_id.is_none() || !saw_done {
        let WsMessage::Binary(bytes) = next_message(&mut stream).await else {
            continue;
        };
        let envelope = Envelope::from_bytes(&bytes).expect("envelope");
        if envelope.parent_id == Some(listen.id) {
            saw_done = envelope.status == Status::Done;
        } else if envelope.syscall == FRAME_SYSCALL {
            frame_id = envelope.data["frame"]["id"].as_u64();
        }
    }
    frames.abort();
    assert!(frame_id.is_some_and(|id| id >= 1));
}
