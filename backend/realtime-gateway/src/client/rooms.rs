/// Client-side record of active room joins
///
/// The server forgets every membership of a dropped connection, so the client
/// replays its joins after each reconnect.
use std::collections::BTreeMap;

use crate::relay::{ClientEvent, RoomId};

#[derive(Debug, Default, Clone)]
pub struct JoinedRooms {
    joins: BTreeMap<RoomId, ClientEvent>,
}

impl JoinedRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an outgoing event; only joins and leaves change the record
    pub fn record(&mut self, event: &ClientEvent) {
        let Ok(room) = event.room() else {
            return;
        };

        match event {
            ClientEvent::JoinRoom { .. }
            | ClientEvent::JoinChat { .. }
            | ClientEvent::JoinPost { .. }
            | ClientEvent::JoinLiveClass { .. } => {
                self.joins.insert(room, event.clone());
            }
            ClientEvent::LeaveRoom { .. }
            | ClientEvent::LeaveChat { .. }
            | ClientEvent::LeavePost { .. }
            | ClientEvent::LeaveLiveClass { .. } => {
                self.joins.remove(&room);
            }
            _ => {}
        }
    }

    /// Join events to re-issue on a fresh connection
    pub fn rejoin_events(&self) -> Vec<ClientEvent> {
        self.joins.values().cloned().collect()
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        self.joins.contains_key(room)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}
