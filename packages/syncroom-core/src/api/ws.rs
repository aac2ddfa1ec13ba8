//! WebSocket handler for room membership, playback control and sync.
//!
//! Frames are JSON text `{"event": <name>, "data": <payload>}`. Replies to a
//! request go to the requesting socket only; room events arrive through the
//! broadcast bridge and are filtered by the socket's current room.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::ws_connection::MembershipGuard;
use crate::api::AppState;
use crate::error::ErrorCode;
use crate::events::{BroadcastEvent, DownloadEvent, RoomEvent};
use crate::playback::{index_from_number, Intent, PlaybackError};
use crate::rooms::{JoinReceipt, RoomCode, RoomError};
use crate::services::download::DownloadRecord;
use crate::services::RoomService;
use crate::sync::Snapshot;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Raw incoming frame. The payload is decoded per event.
#[derive(Deserialize)]
struct WsEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of `room:create`, `room:join` and `room:rejoin`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RoomRequest {
    room_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    session_token: Option<String>,
}

/// Decoded client request.
#[derive(Debug, PartialEq)]
enum WsIncoming {
    Create(RoomRequest),
    Join(RoomRequest),
    Rejoin(RoomRequest),
    Leave,
    Control(Intent),
    Heartbeat,
}

/// Why a frame could not be decoded.
#[derive(Debug, PartialEq)]
enum DecodeError {
    /// Not a JSON envelope, or an event this server does not know.
    Unknown(String),
    /// Known event with an unusable payload.
    Invalid(RoomError),
    Malformed(String),
}

impl WsIncoming {
    fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: WsEnvelope =
            serde_json::from_str(text).map_err(|e| DecodeError::Unknown(e.to_string()))?;
        let data = envelope.data;

        let room_request = |data: serde_json::Value| {
            serde_json::from_value::<RoomRequest>(data)
                .map_err(|e| DecodeError::Malformed(e.to_string()))
        };

        let incoming = match envelope.event.as_str() {
            "room:create" => Self::Create(room_request(data)?),
            "room:join" => Self::Join(room_request(data)?),
            "room:rejoin" => Self::Rejoin(room_request(data)?),
            "room:leave" => Self::Leave,
            "control:play" => Self::Control(Intent::Play),
            "control:pause" => Self::Control(Intent::Pause),
            "control:next" => Self::Control(Intent::Next),
            "control:prev" => Self::Control(Intent::Prev),
            "control:seek" => {
                let position = data.as_f64().ok_or_else(|| {
                    DecodeError::Invalid(PlaybackError::InvalidPosition(data.to_string()).into())
                })?;
                Self::Control(Intent::Seek(position))
            }
            "control:playIndex" => {
                let index = number_to_index(&data)?;
                Self::Control(Intent::SelectIndex(index))
            }
            "player:ended" => {
                let index = match ended_index(&data) {
                    Some(value) => Some(number_to_index(value)?),
                    None => None,
                };
                Self::Control(Intent::TrackEnded { index })
            }
            "heartbeat" => Self::Heartbeat,
            other => return Err(DecodeError::Unknown(other.to_string())),
        };
        Ok(incoming)
    }
}

fn number_to_index(value: &serde_json::Value) -> Result<usize, DecodeError> {
    value
        .as_f64()
        .ok_or_else(|| PlaybackError::InvalidIndex(value.to_string()))
        .and_then(index_from_number)
        .map_err(|e| DecodeError::Invalid(e.into()))
}

/// `player:ended` carries either nothing, a bare index or `{ "index": n }`.
fn ended_index(data: &serde_json::Value) -> Option<&serde_json::Value> {
    match data {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) => map.get("index").filter(|v| !v.is_null()),
        other => Some(other),
    }
}

/// Reply to a successful create/join/rejoin.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomJoinedPayload {
    room_id: RoomCode,
    host_name: String,
    is_host: bool,
    session_token: String,
    display_name: String,
    member_count: usize,
}

impl From<&JoinReceipt> for RoomJoinedPayload {
    fn from(receipt: &JoinReceipt) -> Self {
        Self {
            room_id: receipt.room_id.clone(),
            host_name: receipt.host_name.clone(),
            is_host: receipt.is_host,
            session_token: receipt.session_token.clone(),
            display_name: receipt.display_name.clone(),
            member_count: receipt.member_count,
        }
    }
}

/// Outgoing WebSocket messages.
#[derive(Serialize)]
#[serde(tag = "event", content = "data")]
enum WsOutgoing {
    #[serde(rename = "room:created")]
    RoomCreated(RoomJoinedPayload),
    #[serde(rename = "room:joined")]
    RoomJoined(RoomJoinedPayload),
    #[serde(rename = "room:left")]
    RoomLeft {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
    },
    #[serde(rename = "room:error")]
    RoomError { message: String, code: &'static str },
    #[serde(rename = "room:userJoined")]
    UserJoined {
        #[serde(rename = "displayName")]
        display_name: String,
    },
    #[serde(rename = "room:userLeft")]
    UserLeft {
        #[serde(rename = "displayName")]
        display_name: String,
    },
    #[serde(rename = "room:presence")]
    Presence { count: usize },
    #[serde(rename = "room:hostChanged")]
    HostChanged {
        #[serde(rename = "hostName")]
        host_name: String,
        #[serde(rename = "isHost")]
        is_host: bool,
    },
    #[serde(rename = "sync:state")]
    SyncState(Snapshot),
    #[serde(rename = "download:update")]
    DownloadUpdate(DownloadRecord),
    #[serde(rename = "heartbeat:ack")]
    HeartbeatAck,
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(s) => Some(Message::Text(s.into())),
            Err(e) => {
                log::warn!("[WS] Failed to serialize outgoing message: {}", e);
                None
            }
        }
    }

    fn error(err: &RoomError) -> Self {
        Self::RoomError {
            message: err.to_string(),
            code: err.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Replies for a successful create/join: the confirmation and a fresh snapshot.
fn joined(rooms: &RoomService, receipt: JoinReceipt, created: bool) -> Vec<WsOutgoing> {
    let payload = RoomJoinedPayload::from(&receipt);
    let confirmation = if created {
        WsOutgoing::RoomCreated(payload)
    } else {
        WsOutgoing::RoomJoined(payload)
    };
    vec![confirmation, WsOutgoing::SyncState(rooms.stamp(receipt.state))]
}

/// Executes one client request and returns the replies for the requester.
fn handle_incoming(rooms: &RoomService, conn_id: &str, incoming: WsIncoming) -> Vec<WsOutgoing> {
    let result: Result<Vec<WsOutgoing>, RoomError> = match incoming {
        WsIncoming::Create(req) => rooms
            .create_room(
                conn_id,
                &req.room_id,
                &req.display_name,
                req.session_token.as_deref(),
            )
            .map(|receipt| joined(rooms, receipt, true)),
        WsIncoming::Join(req) => rooms
            .join_room(
                conn_id,
                &req.room_id,
                &req.display_name,
                req.session_token.as_deref(),
            )
            .map(|receipt| joined(rooms, receipt, false)),
        WsIncoming::Rejoin(req) => rooms
            .rejoin_room(
                conn_id,
                &req.room_id,
                &req.display_name,
                req.session_token.as_deref(),
            )
            .map(|receipt| joined(rooms, receipt, false)),
        WsIncoming::Leave => Ok(rooms
            .leave_room(conn_id)
            .map(|receipt| WsOutgoing::RoomLeft {
                room_id: receipt.room_id,
            })
            .into_iter()
            .collect()),
        // The resulting state reaches the requester through the room broadcast.
        WsIncoming::Control(intent) => rooms.handle_intent(conn_id, intent).map(|_| Vec::new()),
        WsIncoming::Heartbeat => Ok(vec![WsOutgoing::HeartbeatAck]),
    };

    result.unwrap_or_else(|e| {
        log::debug!("[WS] {} request rejected: {}", conn_id, e);
        vec![WsOutgoing::error(&e)]
    })
}

/// Decodes and executes a text frame.
fn handle_text(rooms: &RoomService, conn_id: &str, text: &str) -> Vec<WsOutgoing> {
    match WsIncoming::decode(text) {
        Ok(incoming) => handle_incoming(rooms, conn_id, incoming),
        Err(DecodeError::Invalid(e)) => vec![WsOutgoing::error(&e)],
        Err(DecodeError::Malformed(reason)) => vec![WsOutgoing::RoomError {
            message: format!("Malformed request: {}", reason),
            code: "invalid_request",
        }],
        Err(DecodeError::Unknown(what)) => {
            log::debug!("[WS] {} sent unknown message: {}", conn_id, what);
            Vec::new()
        }
    }
}

/// Handles one receive from the broadcast channel. `None` means the channel
/// closed and the connection should end.
///
/// A lagged receiver may have missed state changes, so it gets a fresh
/// snapshot of its room instead.
fn on_broadcast(
    rooms: &RoomService,
    conn_id: &str,
    event: Result<BroadcastEvent, RecvError>,
) -> Option<Vec<WsOutgoing>> {
    match event {
        Ok(event) => Some(route_event(rooms, conn_id, event).into_iter().collect()),
        Err(RecvError::Lagged(skipped)) => {
            log::warn!("[WS] {} lagged, skipped {} event(s); resyncing", conn_id, skipped);
            Some(
                rooms
                    .snapshot_for(conn_id)
                    .map(WsOutgoing::SyncState)
                    .into_iter()
                    .collect(),
            )
        }
        Err(RecvError::Closed) => None,
    }
}

/// Translates a broadcast event into a message for this connection, if it
/// concerns it.
fn route_event(rooms: &RoomService, conn_id: &str, event: BroadcastEvent) -> Option<WsOutgoing> {
    let event = match event {
        BroadcastEvent::Download(DownloadEvent::Updated { job }) => {
            return Some(WsOutgoing::DownloadUpdate(job));
        }
        BroadcastEvent::Room(event) => event,
    };

    // Addressed to a connection that is no longer a member.
    if let RoomEvent::SessionReplaced { connection_id, .. } = &event {
        return (connection_id == conn_id).then(|| WsOutgoing::RoomError {
            message: "Session resumed on another connection".to_string(),
            code: "session_replaced",
        });
    }

    if rooms.room_of(conn_id).as_ref() != Some(event.room_id()) {
        return None;
    }

    match event {
        RoomEvent::StateChanged { state, .. } => Some(WsOutgoing::SyncState(rooms.stamp(state))),
        RoomEvent::MemberJoined {
            connection_id,
            display_name,
            ..
        } => (connection_id != conn_id).then_some(WsOutgoing::UserJoined { display_name }),
        RoomEvent::MemberLeft { display_name, .. } => {
            Some(WsOutgoing::UserLeft { display_name })
        }
        RoomEvent::Presence { count, .. } => Some(WsOutgoing::Presence { count }),
        RoomEvent::HostChanged {
            host_connection,
            host_name,
            ..
        } => Some(WsOutgoing::HostChanged {
            host_name,
            is_host: host_connection == conn_id,
        }),
        RoomEvent::SessionReplaced { .. } => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();
    let conn_id = conn_guard.id().to_string();
    // Declared after the connection guard so it drops first.
    let _membership = MembershipGuard::new(conn_id.clone(), Arc::clone(&state.rooms));

    let (timeout, check_interval) = {
        let config = state.config.read();
        (
            Duration::from_secs(config.ws_heartbeat_timeout_secs),
            Duration::from_secs(config.ws_heartbeat_check_interval_secs),
        )
    };

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat_interval = tokio::time::interval(check_interval);
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    'conn: loop {
        let outgoing: Vec<WsOutgoing> = tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_id);
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&state.rooms, &conn_id, text.as_str()),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => Vec::new(),
                }
            }
            event = broadcast_rx.recv() => match on_broadcast(&state.rooms, &conn_id, event) {
                Some(outgoing) => outgoing,
                None => break,
            },
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_id);
                    break;
                }
                Vec::new()
            }
        };

        for message in outgoing.iter().filter_map(WsOutgoing::to_message) {
            if sender.send(message).await.is_err() {
                break 'conn;
            }
        }
    }

    // MembershipGuard and ConnectionGuard Drop impls handle cleanup
}
