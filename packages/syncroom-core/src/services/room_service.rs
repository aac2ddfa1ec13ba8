//! Room coordinator: registry operations plus the events they produce.
//!
//! Transport handlers call into this service and reply to the requester
//! directly; everything other members need to see goes through the
//! [`EventEmitter`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{EventEmitter, RoomEvent};
use crate::playback::{Intent, Transition};
use crate::rooms::{
    IntentReceipt, JoinReceipt, LeaveReceipt, RoomCode, RoomError, RoomRegistry, RoomSummary,
};
use crate::services::library::{LibraryError, MediaLibrary};
use crate::sync::Snapshot;
use crate::utils::Clock;

pub struct RoomService {
    registry: RoomRegistry,
    /// Held across a membership change and its announcements so presence
    /// counts go out in roster order.
    roster: Mutex<()>,
    library: Arc<MediaLibrary>,
    emitter: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
}

impl RoomService {
    pub fn new(
        library: Arc<MediaLibrary>,
        emitter: Arc<dyn EventEmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(),
            roster: Mutex::new(()),
            library,
            emitter,
            clock,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn library(&self) -> &Arc<MediaLibrary> {
        &self.library
    }

    pub fn create_room(
        &self,
        connection_id: &str,
        room_id: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        let playlist = self.library.playlist().as_ref().clone();
        let _roster = self.roster.lock();
        let receipt = self.registry.create(
            connection_id,
            room_id,
            display_name,
            session_token,
            playlist,
            self.now_ms(),
        )?;
        self.announce_join(&receipt);
        Ok(receipt)
    }

    pub fn join_room(
        &self,
        connection_id: &str,
        room_id: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        let _roster = self.roster.lock();
        let receipt = self
            .registry
            .join(connection_id, room_id, display_name, session_token)?;
        self.announce_join(&receipt);
        Ok(receipt)
    }

    pub fn rejoin_room(
        &self,
        connection_id: &str,
        room_id: &str,
        display_name: &str,
        session_token: Option<&str>,
    ) -> Result<JoinReceipt, RoomError> {
        let _roster = self.roster.lock();
        let receipt = self
            .registry
            .rejoin(connection_id, room_id, display_name, session_token)?;
        self.announce_join(&receipt);
        Ok(receipt)
    }

    /// Removes the connection from its room. Safe to call more than once;
    /// only the first call has an effect.
    pub fn leave_room(&self, connection_id: &str) -> Option<LeaveReceipt> {
        let _roster = self.roster.lock();
        let receipt = self.registry.leave(connection_id)?;
        self.announce_leave(&receipt);
        Some(receipt)
    }

    /// Applies a playback intent and broadcasts the new state if it changed.
    pub fn handle_intent(
        &self,
        connection_id: &str,
        intent: Intent,
    ) -> Result<IntentReceipt, RoomError> {
        let receipt = self
            .registry
            .apply_intent(connection_id, intent, self.now_ms())?;
        if receipt.transition == Transition::Applied {
            self.emitter.emit_room(RoomEvent::StateChanged {
                room_id: receipt.room_id.clone(),
                state: receipt.state.clone(),
            });
        }
        Ok(receipt)
    }

    /// Rescans the library and pushes the new playlist into every room.
    ///
    /// Returns the number of tracks found.
    pub async fn refresh_library(&self) -> Result<usize, LibraryError> {
        let playlist = self.library.rescan().await?;
        let receipts = self.registry.refresh_all(&playlist, self.now_ms());
        for receipt in receipts {
            if receipt.transition == Transition::Applied {
                self.emitter.emit_room(RoomEvent::StateChanged {
                    room_id: receipt.room_id,
                    state: receipt.state,
                });
            }
        }
        Ok(playlist.len())
    }

    pub fn room_of(&self, connection_id: &str) -> Option<RoomCode> {
        self.registry.room_of(connection_id)
    }

    pub fn is_host(&self, connection_id: &str) -> bool {
        self.registry.is_host(connection_id)
    }

    /// Fresh snapshot of the room the connection belongs to.
    pub fn snapshot_for(&self, connection_id: &str) -> Option<Snapshot> {
        let room_id = self.registry.room_of(connection_id)?;
        let state = self.registry.state_of(&room_id)?;
        Some(Snapshot::new(state, self.now_ms()))
    }

    /// Stamps a state with the current server time.
    pub fn stamp(&self, state: crate::playback::PlaybackState) -> Snapshot {
        Snapshot::new(state, self.now_ms())
    }

    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        self.registry.summaries()
    }

    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    fn announce_join(&self, receipt: &JoinReceipt) {
        if let Some(left) = &receipt.left {
            self.announce_leave(left);
        }
        if !receipt.admitted {
            return;
        }
        if let Some(previous) = &receipt.replaced_connection {
            self.emitter.emit_room(RoomEvent::SessionReplaced {
                room_id: receipt.room_id.clone(),
                connection_id: previous.clone(),
            });
        }
        self.emitter.emit_room(RoomEvent::MemberJoined {
            room_id: receipt.room_id.clone(),
            connection_id: receipt.connection_id.clone(),
            display_name: receipt.display_name.clone(),
        });
        self.emitter.emit_room(RoomEvent::Presence {
            room_id: receipt.room_id.clone(),
            count: receipt.member_count,
        });
    }

    fn announce_leave(&self, receipt: &LeaveReceipt) {
        if receipt.room_closed {
            return;
        }
        self.emitter.emit_room(RoomEvent::MemberLeft {
            room_id: receipt.room_id.clone(),
            connection_id: receipt.connection_id.clone(),
            display_name: receipt.display_name.clone(),
        });
        if let Some(host) = &receipt.new_host {
            self.emitter.emit_room(RoomEvent::HostChanged {
                room_id: receipt.room_id.clone(),
                host_connection: host.connection_id.clone(),
                host_name: host.display_name.clone(),
            });
        }
        self.emitter.emit_room(RoomEvent::Presence {
            room_id: receipt.room_id.clone(),
            count: receipt.member_count,
        });
    }
}
