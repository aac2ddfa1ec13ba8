//! A single listening room: roster, host and playback state.

use super::{ConnectionId, RoomCode, SessionToken};
use crate::playback::{PlaybackState, Track};

/// One connected participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub session_token: SessionToken,
    pub display_name: String,
}

/// Result of adding a member to the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Admission {
    /// A new participant.
    Added,
    /// The session token was already present; the member now uses the new
    /// connection and `previous` no longer belongs to the room.
    Resumed { previous: ConnectionId },
}

/// Result of removing a member from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Departure {
    pub member: Member,
    /// Member promoted because the host left.
    pub promoted: Option<Member>,
}

/// Room aggregate. Owned by the registry behind a per-room mutex.
#[derive(Debug)]
pub struct Room {
    id: RoomCode,
    /// Host identity is the session token, so it survives reconnects.
    host_token: SessionToken,
    /// Join order; the first remaining member is promoted when the host leaves.
    members: Vec<Member>,
    state: PlaybackState,
    created_at: u64,
    closed: bool,
}

impl Room {
    pub(crate) fn new(id: RoomCode, host: Member, playlist: Vec<Track>, created_at: u64) -> Self {
        Self {
            id,
            host_token: host.session_token.clone(),
            members: vec![host],
            state: PlaybackState::new(playlist),
            created_at,
            closed: false,
        }
    }

    pub fn id(&self) -> &RoomCode {
        &self.id
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut PlaybackState {
        &mut self.state
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn host(&self) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.session_token == self.host_token)
    }

    /// Display name of the host, empty if the room has no members.
    pub fn host_name(&self) -> &str {
        self.host().map(|m| m.display_name.as_str()).unwrap_or("")
    }

    pub fn is_host(&self, connection_id: &str) -> bool {
        self.host()
            .is_some_and(|m| m.connection_id == connection_id)
    }

    pub fn member(&self, connection_id: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.connection_id == connection_id)
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.member(connection_id).is_some()
    }

    /// Whether the registry has already dropped this room.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Adds `member`, or moves an existing member with the same session token
    /// onto the new connection.
    pub(crate) fn admit(&mut self, member: Member) -> Admission {
        match self
            .members
            .iter_mut()
            .find(|m| m.session_token == member.session_token)
        {
            Some(existing) => {
                let previous = std::mem::replace(&mut existing.connection_id, member.connection_id);
                existing.display_name = member.display_name;
                Admission::Resumed { previous }
            }
            None => {
                self.members.push(member);
                Admission::Added
            }
        }
    }

    /// Removes the member on `connection_id`, promoting a new host if needed.
    pub(crate) fn remove(&mut self, connection_id: &str) -> Option<Departure> {
        let pos = self
            .members
            .iter()
            .position(|m| m.connection_id == connection_id)?;
        let member = self.members.remove(pos);

        let mut promoted = None;
        if member.session_token == self.host_token {
            if let Some(next) = self.members.first() {
                self.host_token = next.session_token.clone();
                promoted = Some(next.clone());
            }
        }
        Some(Departure { member, promoted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u32) -> Member {
        Member {
            connection_id: format!("ws-{n}"),
            session_token: format!("token-{n}"),
            display_name: format!("User {n}"),
        }
    }

    fn room_with(n: u32) -> Room {
        let code = RoomCode::parse("ABC123").unwrap();
        let mut room = Room::new(code, member(1), Vec::new(), 0);
        for i in 2..=n {
            room.admit(member(i));
        }
        room
    }

    #[test]
    fn creator_is_host() {
        let room = room_with(1);
        assert!(room.is_host("ws-1"));
        assert_eq!(room.host_name(), "User 1");
    }

    #[test]
    fn host_leaving_promotes_first_remaining_member() {
        let mut room = room_with(3);
        let departure = room.remove("ws-1").unwrap();
        assert_eq!(departure.promoted.unwrap().connection_id, "ws-2");
        assert!(room.is_host("ws-2"));
        let hosts = room
            .members()
            .iter()
            .filter(|m| room.is_host(&m.connection_id))
            .count();
        assert_eq!(hosts, 1);
    }

    #[test]
    fn non_host_leaving_keeps_host() {
        let mut room = room_with(3);
        let departure = room.remove("ws-3").unwrap();
        assert!(departure.promoted.is_none());
        assert!(room.is_host("ws-1"));
    }

    #[test]
    fn same_token_resumes_on_new_connection() {
        let mut room = room_with(2);
        let admission = room.admit(Member {
            connection_id: "ws-9".into(),
            session_token: "token-1".into(),
            display_name: "User 1".into(),
        });
        assert_eq!(
            admission,
            Admission::Resumed {
                previous: "ws-1".into()
            }
        );
        assert_eq!(room.member_count(), 2);
        assert!(room.is_host("ws-9"));
        assert!(!room.has_connection("ws-1"));
    }

    #[test]
    fn removing_unknown_connection_is_noop() {
        let mut room = room_with(1);
        assert!(room.remove("ws-404").is_none());
        assert_eq!(room.member_count(), 1);
    }
}
