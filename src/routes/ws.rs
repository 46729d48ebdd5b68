//! WebSocket handler: request/response transport for gadgets and renderers.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming envelopes → decode + dispatch by syscall prefix
//! - Outbound queue (frame broadcasts) → forward to client
//!
//! Handler functions are pure business logic: they validate fields, call
//! into the session, and return an `Outcome`. The dispatch layer builds the
//! reply envelope. Errors travel as `error` envelopes with a grepable code.
//!
//! ENCODING
//! ========
//! Binary messages carry protobuf envelopes, text messages carry JSON. Each
//! connection answers in the encoding of the last message it received;
//! before the first message it speaks binary.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `clientId`
//! 2. Client sends requests → dispatch → handler returns Outcome
//! 3. `frame:listen` → frames arrive as `frame:new` requests
//! 4. Close → session drops the client's gadgets and listener

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wire::{GlobalId, Status, addr};
use wire::events::{GrabEvent, GrabbableIntersection, GrabberIntersections, PanelMouseEvent, PokerProximity};
use wire::scene::{SceneNode, TextureInfo, Transform};

use crate::envelope::{Data, Envelope, EnvelopeError, ErrorCode, FieldError};
use crate::services::broadcast::{ChannelListener, FRAME_SYSCALL};
use crate::services::models;
use crate::session::mailbox::MailboxError;
use crate::session::{Counterpart, SessionError};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer turns it into
/// the reply; handlers never touch the socket.
enum Outcome {
    /// Send done+data to sender.
    Reply(Data),
    /// Send empty done to sender.
    Done,
}

type HandlerResult = Result<Outcome, Envelope>;

/// Wire encoding a connection replies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Binary,
    Text,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let mut encoding = Encoding::Binary;

    // Outbound queue shared with this client's frame listener.
    let (client_tx, mut client_rx) = mpsc::channel::<Envelope>(state.config.listener_queue_capacity);

    let welcome = Envelope::request("session:connected", Data::new()).with_data("clientId", client_id.to_string());
    if send_envelope(&mut socket, encoding, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let parsed = match msg {
                    Message::Binary(bytes) => {
                        encoding = Encoding::Binary;
                        Envelope::from_bytes(&bytes)
                    }
                    Message::Text(text) => {
                        encoding = Encoding::Text;
                        Envelope::from_json(text.as_str())
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                for reply in process_inbound(&state, client_id, &client_tx, parsed).await {
                    if send_envelope(&mut socket, encoding, &reply).await.is_err() {
                        break 'conn;
                    }
                }
            }
            Some(envelope) = client_rx.recv() => {
                if send_envelope(&mut socket, encoding, &envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    state.session.lock().await.client_disconnected(client_id);
    info!(%client_id, "ws: client disconnected");
}

async fn send_envelope(socket: &mut WebSocket, encoding: Encoding, envelope: &Envelope) -> Result<(), ()> {
    let msg = match encoding {
        Encoding::Binary => Message::Binary(envelope.to_bytes().into()),
        Encoding::Text => match envelope.to_json() {
            Ok(text) => Message::Text(text.into()),
            Err(e) => {
                warn!(error = %e, syscall = %envelope.syscall, "ws: failed to serialize envelope");
                return Err(());
            }
        },
    };

    if envelope.status == Status::Error {
        let code = envelope.data.get("code").and_then(Value::as_str).unwrap_or("-");
        let message = envelope.data.get("message").and_then(Value::as_str).unwrap_or("-");
        warn!(id = %envelope.id, syscall = %envelope.syscall, code, message, "ws: send error");
    } else if envelope.syscall != FRAME_SYSCALL {
        debug!(id = %envelope.id, syscall = %envelope.syscall, status = ?envelope.status, "ws: send");
    }

    socket.send(msg).await.map_err(|e| {
        debug!(error = %e, "ws: send failed");
    })
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Process one decoded inbound message and return envelopes for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound(
    state: &AppState,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Envelope>,
    parsed: Result<Envelope, EnvelopeError>,
) -> Vec<Envelope> {
    let mut req = match parsed {
        Ok(req) => req,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound envelope");
            let err = Envelope::request("gateway:error", Data::new())
                .with_data("code", "E_INVALID_PARAMETER")
                .with_data("message", format!("invalid envelope: {e}"));
            return vec![err];
        }
    };

    if req.status != Status::Request {
        debug!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: ignoring non-request");
        return Vec::new();
    }

    req.from = Some(client_id.to_string());
    debug!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv");

    let result = match req.prefix() {
        "app" => handle_app(state, client_id, &req).await,
        "gadget" => handle_gadget(state, client_id, &req).await,
        "frame" => handle_frame(state, client_id, client_tx, &req).await,
        "model" => handle_model(state, &req).await,
        "poker" => handle_poker(state, &req).await,
        "panel" => handle_panel(state, &req).await,
        "grabber" => handle_grabber(state, &req).await,
        "grabbable" => handle_grabbable(state, &req).await,
        "session" => handle_session(state, &req).await,
        _ => Err(unknown(&req)),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Err(err) => vec![err],
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Map any coded error into an error reply for `req`.
fn reject<E: ErrorCode>(req: &Envelope) -> impl FnOnce(E) -> Envelope + '_ {
    move |e| req.error_from(&e)
}

fn unknown(req: &Envelope) -> Envelope {
    req.error_from(&SessionError::UnknownSyscall(req.syscall.clone()))
}

fn reply(key: &str, value: impl Into<Value>) -> Outcome {
    let mut data = Data::new();
    data.insert(key.into(), value.into());
    Outcome::Reply(data)
}

fn to_json(req: &Envelope, value: &impl Serialize) -> Result<Value, Envelope> {
    serde_json::to_value(value).map_err(|e| req.error_from(&SessionError::Internal(e.to_string())))
}

/// A list field that may be omitted.
fn list_field<T: DeserializeOwned>(req: &Envelope, field: &'static str) -> Result<Vec<T>, FieldError> {
    match req.data.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => req.parse_field(field),
    }
}

/// A list of global ids, each a number or a decimal string. May be omitted.
fn global_ids_field(req: &Envelope, field: &'static str) -> Result<Vec<GlobalId>, FieldError> {
    let raw: Vec<Value> = list_field(req, field)?;
    raw.iter()
        .map(|v| addr::global_id_from_json(v).ok_or_else(|| FieldError::Invalid { field, reason: format!("{v} is not a global id") }))
        .collect()
}

fn capacity_field(req: &Envelope) -> Result<Option<usize>, FieldError> {
    Ok(req.opt_u32_field("capacity")?.map(|c| usize::try_from(c).unwrap_or(usize::MAX)))
}

/// `{gadgetId, localId}` of the mailbox a pull reads.
fn mailbox_fields(req: &Envelope) -> Result<(u32, u32), FieldError> {
    Ok((req.u32_field("gadgetId")?, req.u32_field("localId")?))
}

/// Reply to a pull. An empty mailbox is a normal `{event: null}` result.
fn pulled<T: Serialize>(req: &Envelope, result: Result<T, SessionError>) -> HandlerResult {
    match result {
        Ok(value) => Ok(reply("event", to_json(req, &value)?)),
        Err(SessionError::Mailbox(MailboxError::NoEvents)) => Ok(reply("event", Value::Null)),
        Err(e) => Err(req.error_from(&e)),
    }
}

// =============================================================================
// APP HANDLERS
// =============================================================================

async fn handle_app(state: &AppState, client_id: Uuid, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "create" => {
            let name = req.str_field("name").map_err(reject(req))?;
            let handle = session.create_app(client_id, name).map_err(reject(req))?;
            Ok(reply("handle", handle))
        }
        "destroy" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            session.destroy_app(handle).map_err(reject(req))?;
            Ok(Outcome::Done)
        }
        "gadgets" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            let gadgets = session.app_gadgets(handle).map_err(reject(req))?;
            Ok(reply("gadgets", json!(gadgets)))
        }
        _ => Err(unknown(req)),
    }
}

// =============================================================================
// GADGET HANDLERS
// =============================================================================

async fn handle_gadget(state: &AppState, client_id: Uuid, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "create" => {
            let name = req.str_field("name").map_err(reject(req))?;
            let hook = req.opt_str_field("hook").unwrap_or_default();
            let app = req.opt_u32_field("app").map_err(reject(req))?;
            let handle = session.create_gadget(client_id, name, hook, app).map_err(reject(req))?;
            let mut data = Data::new();
            data.insert("handle".into(), json!(handle));
            data.insert("gadgetId".into(), json!(handle));
            Ok(Outcome::Reply(data))
        }
        "destroy" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            session.destroy_gadget(handle).map_err(reject(req))?;
            Ok(Outcome::Done)
        }
        "name" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            let name = session.gadget_name(handle).map_err(reject(req))?;
            Ok(reply("name", name))
        }
        "update_scene" => {
            let gadget = req.u32_field("gadgetId").map_err(reject(req))?;
            let nodes: Vec<SceneNode> = list_field(req, "nodes").map_err(reject(req))?;
            session.update_scene(gadget, nodes).map_err(reject(req))?;
            Ok(Outcome::Done)
        }
        "update_texture" => {
            let gadgets: Vec<u32> = list_field(req, "gadgetIds").map_err(reject(req))?;
            let texture: TextureInfo = req.parse_field("texture").map_err(reject(req))?;
            let updated = session.update_texture(&gadgets, &texture);
            Ok(reply("updated", updated))
        }
        _ => Err(unknown(req)),
    }
}

// =============================================================================
// FRAME HANDLERS
// =============================================================================

async fn handle_frame(
    state: &AppState,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Envelope>,
    req: &Envelope,
) -> HandlerResult {
    match req.op() {
        "listen" => {
            let listener = Arc::new(ChannelListener::new(client_id, client_tx.clone()));
            state.session.lock().await.listen_for_frames(client_id, listener);
            info!(%client_id, "ws: client listening for frames");
            Ok(Outcome::Done)
        }
        _ => Err(unknown(req)),
    }
}

// =============================================================================
// MODEL HANDLERS
// =============================================================================

async fn handle_model(state: &AppState, req: &Envelope) -> HandlerResult {
    // Source loads release the session lock around the file read.
    if req.op() == "source" {
        let uri = req.str_field("uri").map_err(reject(req))?;
        let source = models::find_or_create_source(&state.session, uri).await.map_err(reject(req))?;
        let mut data = Data::new();
        data.insert("uri".into(), json!(source.uri()));
        data.insert("data".into(), json!(BASE64.encode(source.data())));
        return Ok(Outcome::Reply(data));
    }

    let mut session = state.session.lock().await;
    match req.op() {
        "create" => {
            let gadget = req.u32_field("gadget").map_err(reject(req))?;
            let uri = req.str_field("uri").map_err(reject(req))?;
            let handle = session.create_model_instance(gadget, uri).map_err(reject(req))?;
            Ok(reply("handle", handle))
        }
        "set_transform" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            let transform: Transform = req.parse_field("transform").map_err(reject(req))?;
            let parent = req.opt_str_field("parent").unwrap_or_default();
            session.set_model_transform(handle, transform, parent).map_err(reject(req))?;
            Ok(Outcome::Done)
        }
        "get_transform" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            let (transform, parent) = session.model_transform(handle).map_err(reject(req))?;
            let mut data = Data::new();
            data.insert("transform".into(), to_json(req, &transform)?);
            data.insert("parent".into(), json!(parent));
            Ok(Outcome::Reply(data))
        }
        "destroy" => {
            let handle = req.u32_field("handle").map_err(reject(req))?;
            session.destroy_model_instance(handle).map_err(reject(req))?;
            Ok(Outcome::Done)
        }
        _ => Err(unknown(req)),
    }
}

// =============================================================================
// MAILBOX HANDLERS
// =============================================================================

async fn handle_poker(state: &AppState, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "push_proximity" => {
            let poker = req.u64_field("pokerId").map_err(reject(req))?;
            let proximity: Vec<PokerProximity> = list_field(req, "proximity").map_err(reject(req))?;
            session.push_poker_proximity(poker, proximity);
            Ok(Outcome::Done)
        }
        "pull" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            let capacity = capacity_field(req).map_err(reject(req))?;
            pulled(req, session.pull_poker(gadget, local, capacity))
        }
        _ => Err(unknown(req)),
    }
}

async fn handle_panel(state: &AppState, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "push_event" => {
            let panel = req.u64_field("panelId").map_err(reject(req))?;
            let event: PanelMouseEvent = req.parse_field("event").map_err(reject(req))?;
            session.push_panel_event(panel, event);
            Ok(Outcome::Done)
        }
        "pull" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            pulled(req, session.pull_panel(gadget, local))
        }
        _ => Err(unknown(req)),
    }
}

async fn handle_grabber(state: &AppState, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "push_intersections" => {
            let grabber_id = req.u64_field("grabberId").map_err(reject(req))?;
            let grabbables: Vec<GrabbableIntersection> = list_field(req, "grabbables").map_err(reject(req))?;
            let hooks = global_ids_field(req, "hooks").map_err(reject(req))?;
            let is_pressed = req.data.get("isPressed").and_then(Value::as_bool).unwrap_or(false);
            session.push_grab_intersections(GrabberIntersections { grabber_id, is_pressed, grabbables, hooks });
            Ok(Outcome::Done)
        }
        "pull_intersections" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            let capacity = capacity_field(req).map_err(reject(req))?;
            pulled(req, session.pull_grabber_intersections(gadget, local, capacity))
        }
        "push_event" => {
            let grabber = req.u64_field("grabberId").map_err(reject(req))?;
            let event: GrabEvent = req.parse_field("event").map_err(reject(req))?;
            session.push_grabber_event(grabber, event);
            Ok(Outcome::Done)
        }
        "pull_event" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            pulled(req, session.pull_grabber_event(gadget, local))
        }
        _ => Err(unknown(req)),
    }
}

async fn handle_grabbable(state: &AppState, req: &Envelope) -> HandlerResult {
    let mut session = state.session.lock().await;
    match req.op() {
        "push_event" => {
            let grabbable = req.u64_field("grabbableId").map_err(reject(req))?;
            let event: GrabEvent = req.parse_field("event").map_err(reject(req))?;
            session.push_grabbable_event(grabbable, event);
            Ok(Outcome::Done)
        }
        "pull_event" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            pulled(req, session.pull_grabbable_event(gadget, local))
        }
        _ => Err(unknown(req)),
    }
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

async fn handle_session(state: &AppState, req: &Envelope) -> HandlerResult {
    match req.op() {
        "last_counterpart" => {
            let (gadget, local) = mailbox_fields(req).map_err(reject(req))?;
            // `kind` names the mailbox being asked, not the answer.
            let kind = match req.str_field("kind").map_err(reject(req))? {
                "grabber" => Counterpart::Grabbable,
                "grabbable" => Counterpart::Grabber,
                other => {
                    let e = FieldError::Invalid { field: "kind", reason: format!("expected grabber or grabbable, got {other}") };
                    return Err(req.error_from(&e));
                }
            };
            let counterpart = state.session.lock().await.last_counterpart(gadget, local, kind).map_err(reject(req))?;
            Ok(reply("counterpart", json!(counterpart)))
        }
        _ => Err(unknown(req)),
    }
}
