//! Concurrent room registry.
//!
//! Rooms live in a `DashMap` keyed by code, each behind its own mutex, so
//! intents for different rooms never contend. A second map tracks which room
//! each connection belongs to.
//!
//! Lock order: a room mutex is only taken after every map reference has been
//! released. Rooms removed from the map are marked closed first, so a request
//! that already cloned the `Arc` observes the removal.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::presence::{summarize, RoomSummary};
use super::room::{Admission, Member, Room};
use super::{ConnectionId, RoomCode, RoomError, SessionToken};
use crate::playback::{apply, Intent, PlaybackState, Track, Transition};
use crate::protocol_constants::{DEFAULT_DISPLAY_NAME, MAX_DISPLAY_NAME_LEN};

/// Outcome of a successful create/join/rejoin, sent back to the requester.
#[derive(Debug, Clone)]
pub struct JoinReceipt {
    pub room_id: RoomCode,
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub session_token: SessionToken,
    pub is_host: bool,
    pub host_name: String,
    pub member_count: usize,
    pub state: PlaybackState,
    /// False when the connection was already a member (idempotent re-join).
    pub admitted: bool,
    /// Older connection of the same session that was dropped from the room.
    pub replaced_connection: Option<ConnectionId>,
    /// The room this connection implicitly left by joining another one.
    pub left: Option<LeaveReceipt>,
}

/// Outcome of a connection leaving its room.
#[derive(Debug, Clone)]
pub struct LeaveReceipt {
    pub room_id: RoomCode,
    pub connection_id: ConnectionId,
    pub display_name: String,
    /// Members remaining after the departure.
    pub member_count: usize,
    /// The room became empty and was deleted.
    pub room_closed: bool,
    /// Member promoted to host because the host left.
    pub new_host: Option<Member>,
}

/// Outcome of an accepted playback intent.
#[derive(Debug, Clone)]
pub struct IntentReceipt {
    pub room_id: RoomCode,
    pub transition: Transition,
    /// State after the intent; unchanged when `transition` is `Ignored`.
    pub state: PlaybackState,
}

/// Which error a join reports when the room does not exist.
#[derive(Clone, Copy)]
enum JoinKind {
    Join,
    Rejoin,
}

/// Owner of all live rooms.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomCode, Arc<Mutex<Room>>>,
    connections: DashMap<ConnectionId, RoomCode>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `code` with `connection_id` as host.
    ///
    /// Fails with `RoomAlreadyExists` if the code is taken. A connection that
    /// was in another room leaves it.
    pub fn create(
        &self,
        connection_id: &str,
        code: &str,
        display_name: &str,
        session_token: Option<&str>,
        playlist: Vec<Track>,
        now_ms: u64,
    ) -> Result<JoinReceipt, RoomError> {
        let code = RoomCode::parse(code)?;
        let host = Member {
            connection_id: connection_id.to_string(),
            session_token: resolve_token(session_token),
            display_name: sanitize_display_name(display_name),
        };

        let room = Room::new(code.clone(), host.clone(), playlist, now_ms);
        let receipt_state = room.state().clone();
        match self.rooms.entry(code.clone()) {
            Entry::Occupied(_) => return Err(RoomError::RoomAlreadyExists(code.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(room)));
            }
        }

        let left = self.leave(connection_id);
        self.connections
            .insert(connection_id.to_string(), code.clone());

        log::info!(
            "[Rooms] {} created room {} as {}",
            connection_id,
            code,
            host.display_name
        );

        Ok(JoinReceipt {
            room_id: code,
            connection_id: host.connection_id,
            host_name: host.display_name.clone(),
            display_name: host.display_name,
            session_token: host.session_token,
            is_host: true,
            member_count: 1,
            state: receipt_state,
            admitted: true,
            replaced_connection: None,
            left,
        })
    }

    /// Joins an existing room. Fails with `RoomNotFound` if it does not exist.
    pub fn join(
        &self,
        connection_id: &str,
        code: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        self.enter(JoinKind::Join, connection_id, code, display_name, session_token)
    }

    /// Joins after a reconnect. Fails with `RoomGone` if the room was deleted
    /// in the meantime.
    pub fn rejoin(
        &self,
        connection_id: &str,
        code: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        self.enter(JoinKind::Rejoin, connection_id, code, display_name, session_token)
    }

    fn enter(
        &self,
        kind: JoinKind,
        connection_id: &str,
        code: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        let code = RoomCode::parse(code)?;
        let missing = || match kind {
            JoinKind::Join => RoomError::RoomNotFound(code.to_string()),
            JoinKind::Rejoin => RoomError::RoomGone(code.to_string()),
        };

        let room = self.room_arc(&code).ok_or_else(missing)?;
        let switching = self
            .room_of(connection_id)
            .is_some_and(|current| current != code);

        // The previous room is only left once admission succeeded, so a
        // failed join keeps the current membership.
        let mut guard = room.lock();
        if guard.is_closed() {
            return Err(missing());
        }

        if let Some(existing) = guard.member(connection_id).cloned() {
            return Ok(JoinReceipt {
                room_id: code,
                connection_id: existing.connection_id,
                display_name: existing.display_name,
                session_token: existing.session_token,
                is_host: guard.is_host(connection_id),
                host_name: guard.host_name().to_string(),
                member_count: guard.member_count(),
                state: guard.state().clone(),
                admitted: false,
                replaced_connection: None,
                left: None,
            });
        }

        let member = Member {
            connection_id: connection_id.to_string(),
            session_token: resolve_token(session_token),
            display_name: sanitize_display_name(display_name),
        };
        let replaced_connection = match guard.admit(member.clone()) {
            Admission::Added => None,
            Admission::Resumed { previous } => Some(previous),
        };

        let mut receipt = JoinReceipt {
            room_id: code.clone(),
            connection_id: member.connection_id,
            display_name: member.display_name,
            session_token: member.session_token,
            is_host: guard.is_host(connection_id),
            host_name: guard.host_name().to_string(),
            member_count: guard.member_count(),
            state: guard.state().clone(),
            admitted: true,
            replaced_connection,
            left: None,
        };
        drop(guard);

        if switching {
            receipt.left = self.leave(connection_id);
        }

        if let Some(previous) = &receipt.replaced_connection {
            self.connections.remove_if(previous, |_, room_id| *room_id == code);
        }
        self.connections
            .insert(connection_id.to_string(), code.clone());

        log::info!(
            "[Rooms] {} joined room {} ({} members)",
            connection_id,
            code,
            receipt.member_count
        );

        Ok(receipt)
    }

    /// Removes `connection_id` from its room, deleting the room when it
    /// empties. Returns `None` if the connection was in no room.
    pub fn leave(&self, connection_id: &str) -> Option<LeaveReceipt> {
        let (_, code) = self.connections.remove(connection_id)?;
        let room = self.room_arc(&code)?;

        let mut guard = room.lock();
        let departure = guard.remove(connection_id)?;
        let room_closed = guard.member_count() == 0;
        if room_closed {
            guard.close();
        }
        let receipt = LeaveReceipt {
            room_id: code.clone(),
            connection_id: departure.member.connection_id,
            display_name: departure.member.display_name,
            member_count: guard.member_count(),
            room_closed,
            new_host: departure.promoted,
        };
        drop(guard);

        if room_closed {
            self.rooms.remove_if(&code, |_, r| Arc::ptr_eq(r, &room));
            log::info!("[Rooms] Room {} is empty, deleted", code);
        } else if let Some(host) = &receipt.new_host {
            log::info!(
                "[Rooms] Host of {} left, promoted {}",
                code,
                host.display_name
            );
        }

        Some(receipt)
    }

    /// Applies a playback intent from `connection_id` to the room it belongs to.
    ///
    /// Any member may control playback; connections outside a room get
    /// `Unauthorized`.
    pub fn apply_intent(
        &self,
        connection_id: &str,
        intent: Intent,
        now_ms: u64,
    ) -> Result<IntentReceipt, RoomError> {
        let code = self.room_of(connection_id).ok_or(RoomError::Unauthorized)?;
        let room = self.room_arc(&code).ok_or(RoomError::Unauthorized)?;

        let mut guard = room.lock();
        if guard.is_closed() || !guard.has_connection(connection_id) {
            return Err(RoomError::Unauthorized);
        }
        let name = intent.name();
        let transition = apply(guard.state_mut(), intent, now_ms)?;
        let state = guard.state().clone();
        drop(guard);

        if transition == Transition::Applied {
            log::debug!(
                "[Rooms] {} applied {} in {} -> v{}",
                connection_id,
                name,
                code,
                state.version
            );
        }

        Ok(IntentReceipt {
            room_id: code,
            transition,
            state,
        })
    }

    /// Replaces the playlist of every live room.
    pub fn refresh_all(&self, playlist: &[Track], now_ms: u64) -> Vec<IntentReceipt> {
        let rooms: Vec<(RoomCode, Arc<Mutex<Room>>)> = self
            .rooms
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut receipts = Vec::with_capacity(rooms.len());
        for (code, room) in rooms {
            let mut guard = room.lock();
            if guard.is_closed() {
                continue;
            }
            match apply(
                guard.state_mut(),
                Intent::RefreshPlaylist(playlist.to_vec()),
                now_ms,
            ) {
                Ok(transition) => receipts.push(IntentReceipt {
                    room_id: code,
                    transition,
                    state: guard.state().clone(),
                }),
                Err(e) => log::warn!("[Rooms] Failed to refresh playlist of {}: {}", code, e),
            }
        }
        receipts
    }

    /// Room the connection currently belongs to.
    pub fn room_of(&self, connection_id: &str) -> Option<RoomCode> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Current playback state of a room.
    pub fn state_of(&self, code: &RoomCode) -> Option<PlaybackState> {
        let room = self.room_arc(code)?;
        let guard = room.lock();
        (!guard.is_closed()).then(|| guard.state().clone())
    }

    /// Whether `connection_id` is the host of its room.
    pub fn is_host(&self, connection_id: &str) -> bool {
        let Some(code) = self.room_of(connection_id) else {
            return false;
        };
        self.room_arc(&code)
            .is_some_and(|room| room.lock().is_host(connection_id))
    }

    /// Summaries of all live rooms, ordered by code.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Mutex<Room>>> = self
            .rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut summaries: Vec<RoomSummary> = rooms
            .iter()
            .filter_map(|room| {
                let guard = room.lock();
                (!guard.is_closed()).then(|| summarize(&guard))
            })
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn room_arc(&self, code: &RoomCode) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(code).map(|entry| Arc::clone(entry.value()))
    }
}

/// Trims a client-supplied name, caps its length and falls back to a default.
pub(crate) fn sanitize_display_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(MAX_DISPLAY_NAME_LEN).collect();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        DEFAULT_DISPLAY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn resolve_token(token: Option<&str>) -> SessionToken {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
